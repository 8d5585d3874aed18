use crate::core::Transaction;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;

/// Binary hash tree committing to an ordered list of byte strings.
///
/// Leaves hold `H(data)`, internal nodes `H(left ‖ right)`. A level with an
/// odd number of nodes pairs its last node with itself. A tree over a single
/// item has that item's leaf as its root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    root: MerkleNode,
    leaf_count: usize,
}

#[derive(Debug, Clone)]
struct MerkleNode {
    hash: Vec<u8>,
    left: Option<Box<MerkleNode>>,
    right: Option<Box<MerkleNode>>,
}

/// Inclusion proof for one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Hash of the leaf being proven
    pub leaf_hash: Vec<u8>,
    /// Root the proof resolves to
    pub merkle_root: Vec<u8>,
    /// Sibling hashes from the leaf level upwards
    pub proof_path: Vec<ProofElement>,
    pub leaf_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofElement {
    pub hash: Vec<u8>,
    /// true if the sibling sits to the right of the running hash
    pub is_right: bool,
}

impl MerkleNode {
    fn leaf(data: &[u8]) -> MerkleNode {
        MerkleNode {
            hash: sha256_digest(data),
            left: None,
            right: None,
        }
    }

    fn branch(left: MerkleNode, right: MerkleNode) -> MerkleNode {
        MerkleNode {
            hash: hash_pair(&left.hash, &right.hash),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut combined = Vec::with_capacity(left.len() + right.len());
    combined.extend_from_slice(left);
    combined.extend_from_slice(right);
    sha256_digest(&combined)
}

impl MerkleTree {
    /// Builds the tree over raw leaf data, in order.
    pub fn new<T: AsRef<[u8]>>(data: &[T]) -> Result<MerkleTree> {
        if data.is_empty() {
            return Err(LedgerError::Integrity(
                "Cannot build a Merkle tree without leaves".to_string(),
            ));
        }

        let mut level: Vec<MerkleNode> = data.iter().map(|d| MerkleNode::leaf(d.as_ref())).collect();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                if let Some(last) = level.last().cloned() {
                    level.push(last);
                }
            }

            let mut next_level = Vec::with_capacity(level.len() / 2);
            let mut nodes = level.into_iter();
            while let (Some(left), Some(right)) = (nodes.next(), nodes.next()) {
                next_level.push(MerkleNode::branch(left, right));
            }
            level = next_level;
        }

        let root = level.pop().ok_or_else(|| {
            LedgerError::Integrity("Merkle tree construction produced no root".to_string())
        })?;

        Ok(MerkleTree {
            root,
            leaf_count: data.len(),
        })
    }

    /// Builds the tree over the serialized form of each transaction.
    pub fn from_transactions(transactions: &[Transaction]) -> Result<MerkleTree> {
        let leaves = transactions
            .iter()
            .map(|tx| tx.serialize())
            .collect::<Result<Vec<Vec<u8>>>>()?;
        Self::new(&leaves)
    }

    pub fn root_hash(&self) -> &[u8] {
        self.root.hash.as_slice()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Hashes of the leaves, left to right, without the padding duplicates.
    pub fn leaf_hashes(&self) -> Vec<Vec<u8>> {
        let mut leaves = Vec::with_capacity(self.leaf_count);
        collect_leaves(&self.root, &mut leaves);
        leaves.truncate(self.leaf_count);
        leaves
    }

    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count {
            return Err(LedgerError::NotFound(format!(
                "Leaf index {leaf_index} out of bounds ({} leaves)",
                self.leaf_count
            )));
        }

        let mut level = self.leaf_hashes();
        let leaf_hash = level[leaf_index].clone();
        let mut index = leaf_index;
        let mut proof_path = Vec::new();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = level[level.len() - 1].clone();
                level.push(last);
            }

            let sibling = index ^ 1;
            proof_path.push(ProofElement {
                hash: level[sibling].clone(),
                is_right: sibling > index,
            });

            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash,
            merkle_root: self.root.hash.clone(),
            proof_path,
            leaf_index,
        })
    }
}

fn collect_leaves(node: &MerkleNode, leaves: &mut Vec<Vec<u8>>) {
    match (&node.left, &node.right) {
        (Some(left), Some(right)) => {
            collect_leaves(left, leaves);
            collect_leaves(right, leaves);
        }
        _ => leaves.push(node.hash.clone()),
    }
}

impl MerkleProof {
    pub fn verify(&self) -> bool {
        let mut current_hash = self.leaf_hash.clone();
        for element in &self.proof_path {
            current_hash = if element.is_right {
                hash_pair(&current_hash, &element.hash)
            } else {
                hash_pair(&element.hash, &current_hash)
            };
        }
        current_hash == self.merkle_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i, i + 1, i + 2]).collect()
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::new(&[b"only".to_vec()]).unwrap();
        assert_eq!(tree.root_hash(), sha256_digest(b"only").as_slice());
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_two_leaves() {
        let data = leaves(2);
        let tree = MerkleTree::new(&data).unwrap();
        let expected = hash_pair(&sha256_digest(&data[0]), &sha256_digest(&data[1]));
        assert_eq!(tree.root_hash(), expected.as_slice());
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        let data = leaves(3);
        let tree = MerkleTree::new(&data).unwrap();

        let h: Vec<Vec<u8>> = data.iter().map(|d| sha256_digest(d)).collect();
        let left = hash_pair(&h[0], &h[1]);
        let right = hash_pair(&h[2], &h[2]);
        assert_eq!(tree.root_hash(), hash_pair(&left, &right).as_slice());
    }

    #[test]
    fn test_odd_upper_level_is_padded_too() {
        // 5 leaves -> 3 parents (odd) -> 2 -> 1
        let data = leaves(5);
        let tree = MerkleTree::new(&data).unwrap();

        let h: Vec<Vec<u8>> = data.iter().map(|d| sha256_digest(d)).collect();
        let p0 = hash_pair(&h[0], &h[1]);
        let p1 = hash_pair(&h[2], &h[3]);
        let p2 = hash_pair(&h[4], &h[4]);
        let q0 = hash_pair(&p0, &p1);
        let q1 = hash_pair(&p2, &p2);
        assert_eq!(tree.root_hash(), hash_pair(&q0, &q1).as_slice());
    }

    #[test]
    fn test_order_changes_root() {
        let data = leaves(4);
        let mut reordered = data.clone();
        reordered.swap(0, 3);

        let a = MerkleTree::new(&data).unwrap();
        let b = MerkleTree::new(&reordered).unwrap();
        assert_ne!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let empty: Vec<Vec<u8>> = vec![];
        assert!(MerkleTree::new(&empty).is_err());
    }

    #[test]
    fn test_leaf_hashes_drop_padding() {
        let data = leaves(3);
        let tree = MerkleTree::new(&data).unwrap();
        let hashes = tree.leaf_hashes();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[2], sha256_digest(&data[2]));
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in 1..=7 {
            let data = leaves(n);
            let tree = MerkleTree::new(&data).unwrap();
            for i in 0..data.len() {
                let proof = tree.generate_proof(i).unwrap();
                assert_eq!(proof.merkle_root, tree.root_hash());
                assert!(proof.verify(), "proof for leaf {i} of {n} failed");
            }
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = MerkleTree::new(&leaves(4)).unwrap();
        let mut proof = tree.generate_proof(2).unwrap();
        proof.leaf_hash = sha256_digest(b"forged");
        assert!(!proof.verify());
        assert!(tree.generate_proof(4).is_err());
    }
}

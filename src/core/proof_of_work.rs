use crate::core::Block;
use crate::error::Result;
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, error, info};
use num_bigint::BigUint;
use std::ops::ShlAssign;

const MAX_NONCE: i64 = i64::MAX;

/// Difficulties a chain may be created with, in leading zero bits.
pub const MIN_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 255;

pub fn is_supported_difficulty(difficulty: u32) -> bool {
    (MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty)
}

/// Binds a block's contents to a nonce whose hash falls under
/// `2^(256 - difficulty)`.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    merkle_root: Vec<u8>,
    target: BigUint,
    difficulty: u32,
}

pub fn target_for(difficulty: u32) -> BigUint {
    let mut target = BigUint::from(1u8);
    target.shl_assign(256 - difficulty.min(256) as usize);
    target
}

impl<'a> ProofOfWork<'a> {
    /// The Merkle root is recomputed from the block's transactions rather
    /// than read from the stored field, so altered transactions change the
    /// hash.
    pub fn new_proof_of_work(block: &'a Block) -> Result<ProofOfWork<'a>> {
        let difficulty = block.get_difficulty();
        Ok(ProofOfWork {
            block,
            merkle_root: block.hash_transactions()?,
            target: target_for(difficulty),
            difficulty,
        })
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let pre_block_hash = self.block.get_pre_block_hash();
        let mut data_bytes =
            Vec::with_capacity(self.merkle_root.len() + pre_block_hash.len() + 16);
        data_bytes.extend(self.merkle_root.as_slice());
        data_bytes.extend(pre_block_hash);
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(i64::from(self.difficulty).to_be_bytes());
        data_bytes
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    /// Searches nonces upward from zero and returns the first one whose hash
    /// meets the target, together with that hash.
    pub fn run(&self) -> (i64, Vec<u8>) {
        let mut nonce = 0;
        let mut hash = Vec::new();
        debug!("Mining with target {}", self.target.to_str_radix(16));
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce);
            hash = sha256_digest(data.as_slice());
            if self.meets_target(&hash) {
                break;
            }
            nonce += 1;
        }
        info!("Found nonce {nonce}: {}", HEXLOWER.encode(hash.as_slice()));
        (nonce, hash)
    }

    /// Recomputes the hash with the block's stored nonce; it must equal the
    /// stored hash and fall under the target. A block claiming a difficulty
    /// outside the supported range never validates.
    pub fn validate(block: &Block) -> bool {
        if !is_supported_difficulty(block.get_difficulty()) {
            error!(
                "Block {} claims unsupported difficulty {}",
                HEXLOWER.encode(block.get_hash()),
                block.get_difficulty()
            );
            return false;
        }
        let pow = match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow,
            Err(e) => {
                error!("Cannot recompute Merkle root for validation: {e}");
                return false;
            }
        };
        let data = pow.prepare_data(block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        hash == block.get_hash() && pow.meets_target(&hash)
    }

    /// [`ProofOfWork::validate`] for a block of a chain mined at `difficulty`.
    pub fn validate_at(block: &Block, difficulty: u32) -> bool {
        if block.get_difficulty() != difficulty {
            error!(
                "Block {} was mined at difficulty {}, chain requires {difficulty}",
                HEXLOWER.encode(block.get_hash()),
                block.get_difficulty()
            );
            return false;
        }
        Self::validate(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;

    const TEST_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn create_test_block(difficulty: u32) -> Block {
        let coinbase_tx = Transaction::new_coinbase_tx(TEST_ADDRESS, "pow test").unwrap();
        Block::new_block(vec![], &[coinbase_tx], difficulty).unwrap()
    }

    #[test]
    fn test_mined_block_validates() {
        let block = create_test_block(8);
        assert!(ProofOfWork::validate(&block));
        assert_eq!(block.get_hash()[0], 0);
    }

    #[test]
    fn test_mining_is_deterministic() {
        let block = create_test_block(8);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        let (nonce, hash) = pow.run();
        assert_eq!(nonce, block.get_nonce());
        assert_eq!(hash, block.get_hash());
    }

    #[test]
    fn test_mined_nonce_is_first_match() {
        let block = create_test_block(6);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        for nonce in 0..block.get_nonce() {
            let hash = sha256_digest(&pow.prepare_data(nonce));
            assert!(!pow.meets_target(&hash), "nonce {nonce} already met target");
        }
    }

    #[test]
    fn test_higher_difficulty_has_smaller_target() {
        assert!(target_for(12) < target_for(4));
        assert_eq!(target_for(1), BigUint::from(1u8) << 255usize);
    }

    #[test]
    fn test_prepare_data_layout() {
        let block = create_test_block(4);
        let pow = ProofOfWork::new_proof_of_work(&block).unwrap();
        let data = pow.prepare_data(12345);

        // genesis has an empty previous hash
        assert_eq!(data.len(), 32 + 8 + 8);
        assert_eq!(&data[..32], block.get_merkle_root());
        assert_eq!(&data[32..40], &12345i64.to_be_bytes());
        assert_eq!(&data[40..], &4i64.to_be_bytes());
        assert_ne!(pow.prepare_data(12345), pow.prepare_data(54321));
    }

    #[test]
    fn test_validate_at_requires_chain_difficulty() {
        let block = create_test_block(6);
        assert!(ProofOfWork::validate_at(&block, 6));
        assert!(!ProofOfWork::validate_at(&block, 8));
        assert!(!ProofOfWork::validate_at(&block, 4));
    }

    #[test]
    fn test_supported_difficulty_range() {
        assert!(!is_supported_difficulty(0));
        assert!(is_supported_difficulty(1));
        assert!(is_supported_difficulty(255));
        assert!(!is_supported_difficulty(256));
    }
}

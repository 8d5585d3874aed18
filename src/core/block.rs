use crate::core::proof_of_work::{is_supported_difficulty, MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::core::{MerkleProof, MerkleTree, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// A mined, immutable batch of transactions linked to its predecessor.
///
/// The proof-of-work hash doubles as the block's identifier and storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    hash: Vec<u8>,
    pre_block_hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    difficulty: u32,
    merkle_root: Vec<u8>,
}

impl Block {
    /// Mines a block over `transactions` on top of `pre_block_hash`
    /// (empty for genesis).
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        difficulty: u32,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::Transaction(
                "Block must contain at least one transaction".to_string(),
            ));
        }
        if !is_supported_difficulty(difficulty) {
            return Err(LedgerError::Config(format!(
                "Difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {difficulty}"
            )));
        }

        let merkle_root = MerkleTree::from_transactions(transactions)?
            .root_hash()
            .to_vec();

        let mut block = Block {
            hash: vec![],
            pre_block_hash,
            transactions: transactions.to_vec(),
            nonce: 0,
            difficulty,
            merkle_root,
        };

        info!(
            "Starting proof-of-work for block with {} transactions at difficulty {difficulty}",
            block.transactions.len()
        );
        let (nonce, hash) = ProofOfWork::new_proof_of_work(&block)?.run();
        block.nonce = nonce;
        block.hash = hash;

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction, difficulty: u32) -> Result<Block> {
        Block::new_block(vec![], std::slice::from_ref(coinbase), difficulty)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(self.hash.as_slice())
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_merkle_root(&self) -> &[u8] {
        self.merkle_root.as_slice()
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    /// Merkle root recomputed from the current transaction list.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        Ok(MerkleTree::from_transactions(&self.transactions)?
            .root_hash()
            .to_vec())
    }

    pub fn verify_merkle_root(&self) -> Result<bool> {
        Ok(self.hash_transactions()? == self.merkle_root)
    }

    pub fn generate_merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::from_transactions(&self.transactions)?.generate_proof(transaction_index)
    }

    /// A proof only counts for this block if it resolves to the stored root.
    pub fn verify_merkle_proof(&self, proof: &MerkleProof) -> bool {
        proof.merkle_root == self.merkle_root && proof.verify()
    }

    #[cfg(test)]
    pub(crate) fn with_transactions(mut self, transactions: Vec<Transaction>) -> Block {
        self.transactions = transactions;
        self
    }
}

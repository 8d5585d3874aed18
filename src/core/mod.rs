//! Core ledger functionality
//!
//! Blocks, transactions, the Merkle commitment, proof-of-work and the
//! persisted chain itself.

pub mod block;
pub mod ledger;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use ledger::{BlockSummary, Ledger, LedgerIterator};
pub use merkle::{MerkleProof, MerkleTree, ProofElement};
pub use proof_of_work::ProofOfWork;
pub use transaction::{Signer, TXInput, TXOutput, Transaction, COINBASE_REWARD};

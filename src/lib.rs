//! # Ledger Chain - a single-node proof-of-work ledger
//!
//! An append-only chain of mined blocks holding value transfers, plus the
//! index of unspent outputs derived from it. There is no networking: one
//! command invocation opens the store, does its work and closes it again.
//!
//! ## Layout
//! - `core/`: blocks, transactions, Merkle commitment, proof-of-work, the ledger
//! - `storage/`: the UTXO index kept next to the blocks in the same sled database
//! - `wallet/`: ECDSA P-256 key pairs, addresses and the wallet file
//! - `config/`: data directory, wallet file and difficulty settings
//! - `utils/`: hashing, signatures, base58 and the binary record encoding
//! - `cli/`: command-line argument parsing
//!
//! ## Flow
//! 1. Build a transaction with [`Transaction::new_utxo_transaction`], which
//!    picks inputs from the [`UTXOSet`] and signs them.
//! 2. Mine it into a block with [`Ledger::append_block`].
//! 3. Apply that block to the index with [`UTXOSet::update`], exactly once.
//!
//! The ledger is the source of truth. [`UTXOSet::reindex`] rebuilds the
//! index from it at any time.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, BlockSummary, Ledger, LedgerIterator, MerkleProof, MerkleTree, ProofElement,
    ProofOfWork, Signer, TXInput, TXOutput, Transaction, COINBASE_REWARD,
};
pub use error::{LedgerError, Result};
pub use storage::{UTXOSet, UnspentOutput};
pub use utils::{
    base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};

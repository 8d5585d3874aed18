//! Derived storage
//!
//! The UTXO index lives in the same sled database as the blocks, under its
//! own key prefix, and can always be rebuilt from the chain.

pub mod utxo_set;

pub use utxo_set::{UTXOSet, UnspentOutput, UTXO_PREFIX};

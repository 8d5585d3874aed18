//! Wallet key pairs and the address codec
//!
//! The ledger never encodes or decodes addresses itself; it only stores and
//! compares public key hashes produced by the functions exported here.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;

//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`LedgerError`]. The variants
//! follow the failure classes the driver has to tell apart: configuration and
//! storage problems end the current invocation, while insufficient funds and
//! integrity failures are ordinary outcomes reported back to the user.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Ledger already exists / does not exist, or a malformed setting
    Config(String),
    /// Underlying key-value store failure
    Storage(String),
    /// Encoding or decoding of a stored record failed
    Serialization(String),
    /// Unknown transaction id, missing block or missing UTXO entry
    NotFound(String),
    /// Proof-of-work, signature or double-spend check failed
    Integrity(String),
    /// Spend amount exceeds the discoverable balance
    InsufficientFunds { required: u64, available: u64 },
    /// Structurally invalid transaction
    Transaction(String),
    /// Key generation, signing or hashing failure
    Crypto(String),
    /// Address failed base58 decoding or checksum verification
    InvalidAddress(String),
    /// Wallet lookup or wallet file failure
    Wallet(String),
    /// File I/O errors
    Io(String),
}

impl LedgerError {
    /// Whether the error should abort the current invocation.
    ///
    /// Insufficient funds, failed signatures and bad addresses are reachable
    /// through plain user mistakes and are reported, not treated as corruption.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::Config(_)
                | LedgerError::Storage(_)
                | LedgerError::Serialization(_)
                | LedgerError::Io(_)
        )
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Storage(msg) => write!(f, "Storage error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::NotFound(msg) => write!(f, "Not found: {msg}"),
            LedgerError::Integrity(msg) => write!(f, "Integrity error: {msg}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(err: sled::transaction::TransactionError<LedgerError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => LedgerError::Storage(e.to_string()),
        }
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

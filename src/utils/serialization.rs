//! Stable binary encoding for blocks, transactions, UTXO entries and wallets.
//!
//! Everything goes through bincode's standard configuration so that a value
//! written by one invocation decodes identically in the next.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| LedgerError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, consumed) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| LedgerError::Serialization(format!("Deserialization failed: {e}")))?;
    if consumed != bytes.len() {
        return Err(LedgerError::Serialization(format!(
            "Trailing bytes after record: decoded {consumed} of {}",
            bytes.len()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXOutput, Transaction};

    #[test]
    fn test_transaction_survives_storage_encoding() {
        let tx = Transaction::new_coinbase_tx("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "genesis")
            .unwrap();
        let bytes = serialize(&tx).unwrap();
        let decoded: Transaction = deserialize(&bytes).unwrap();

        assert_eq!(decoded.get_id(), tx.get_id());
        assert_eq!(decoded.get_vout(), tx.get_vout());
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let outputs = vec![TXOutput::new_with_hash(7, vec![1; 20])];
        let mut bytes = serialize(&outputs).unwrap();
        bytes.push(0xAB);
        let result: Result<Vec<TXOutput>> = deserialize(&bytes);
        assert!(matches!(result, Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Transaction> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}

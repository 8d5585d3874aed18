// Value transfer in the UTXO model: a transaction consumes whole outputs of
// earlier transactions and creates new outputs, returning change to the payer.

use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::utils::{deserialize, ecdsa_p256_sha256_sign_verify, serialize, sha256_digest};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key};
use data_encoding::HEXLOWER;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Fixed amount minted by every coinbase transaction
pub const COINBASE_REWARD: u64 = 100;

/// Output index carried by the single input of a coinbase transaction
pub const COINBASE_VOUT: i64 = -1;

/// Key pair capability used to authorize spends.
///
/// The ledger only needs the raw public key (embedded in each input) and a
/// way to sign a digest; where the private key lives is up to the wallet.
pub trait Signer {
    fn public_key(&self) -> &[u8];
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Reference to one output of an earlier transaction plus the proof that the
/// spender owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout: vout as i64,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    /// Index into the referenced transaction's outputs; `None` for the
    /// coinbase marker or any other negative index.
    pub fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()) == pub_key_hash
    }
}

/// An amount locked to the hash of its owner's public key. Never partially
/// spent: a spend consumes it whole and change becomes a new output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        Ok(TXOutput {
            value,
            pub_key_hash,
        })
    }

    pub fn new_with_hash(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash == pub_key_hash
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint transaction paying [`COINBASE_REWARD`] to `to`.
    ///
    /// `data` fills the input's authorization slot; when empty a random
    /// string is used so two coinbases to the same address get distinct ids.
    pub fn new_coinbase_tx(to: &str, data: &str) -> Result<Transaction> {
        let data = if data.is_empty() {
            format!("Coins to {to} ({})", Uuid::new_v4())
        } else {
            data.to_string()
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: data.into_bytes(),
            pub_key: vec![],
        };
        let txout = TXOutput::new(COINBASE_REWARD, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds and signs a transfer of `amount` from the signer to `to`.
    ///
    /// Inputs are picked greedily from the UTXO index; change goes back to
    /// the signer's own public key hash.
    pub fn new_utxo_transaction<S: Signer>(
        from: &S,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        let from_pub_key_hash = hash_pub_key(from.public_key());
        let to_pub_key_hash = address_to_pub_key_hash(to)?;

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(from_pub_key_hash.as_slice(), amount)?;

        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::Serialization(format!("Invalid transaction ID {txid_hex}: {e}"))
            })?;
            for out in outs {
                let mut input = TXInput::new(txid.as_slice(), out);
                input.pub_key = from.public_key().to_vec();
                inputs.push(input);
            }
        }

        let mut outputs = vec![TXOutput::new_with_hash(amount, to_pub_key_hash)];
        if accumulated > amount {
            outputs.push(TXOutput::new_with_hash(
                accumulated - amount,
                from_pub_key_hash,
            ));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        utxo_set.get_ledger().sign_transaction(&mut tx, from)?;
        debug!(
            "Built transaction {} spending {} inputs",
            HEXLOWER.encode(tx.get_id()),
            tx.vin.len()
        );
        Ok(tx)
    }

    /// Copy with every input's signature and public key cleared.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            })
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    // The digest for input `idx` covers the id and the trimmed copy with only
    // that input's key slot holding the locking hash of the output it spends.
    fn signing_digest(trimmed: &mut Transaction, idx: usize, locking_hash: &[u8]) -> Result<Vec<u8>> {
        trimmed.vin[idx].pub_key = locking_hash.to_vec();
        let digest = Transaction::serialize(trimmed).map(|bytes| sha256_digest(bytes.as_slice()));
        trimmed.vin[idx].pub_key = vec![];
        digest
    }

    /// Resolves the output spent by `input` among `prev_txs`.
    fn referenced_output<'a>(
        input: &TXInput,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Option<&'a TXOutput> {
        let prev_tx = prev_txs.get(&HEXLOWER.encode(input.get_txid()))?;
        prev_tx.vout.get(input.output_index()?)
    }

    /// Signs every input, given the transactions they spend keyed by hex id.
    pub fn sign<S: Signer + ?Sized>(
        &mut self,
        signer: &S,
        prev_txs: &HashMap<String, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        if self.vin.is_empty() {
            return Err(LedgerError::Transaction(
                "Transaction has no inputs".to_string(),
            ));
        }
        if self.id.is_empty() {
            return Err(LedgerError::Transaction(
                "Transaction id must be set before signing".to_string(),
            ));
        }

        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let locking_hash = Self::referenced_output(&self.vin[idx], prev_txs)
                .ok_or_else(|| {
                    LedgerError::NotFound(format!(
                        "Output {}:{} referenced by input {idx}",
                        HEXLOWER.encode(self.vin[idx].get_txid()),
                        self.vin[idx].get_vout()
                    ))
                })?
                .get_pub_key_hash()
                .to_vec();

            let digest = Self::signing_digest(&mut tx_copy, idx, &locking_hash)?;
            self.vin[idx].signature = signer.sign(digest.as_slice())?;
            self.vin[idx].pub_key = signer.public_key().to_vec();
        }
        Ok(())
    }

    /// Checks every input's signature against its embedded public key and the
    /// locking hash of the output it spends. Any unresolvable reference or
    /// bad signature yields `false`.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.vin.is_empty() {
            return false;
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = match Self::referenced_output(vin, prev_txs) {
                Some(output) => output,
                None => {
                    warn!(
                        "Input {idx} references unknown output {}:{}",
                        HEXLOWER.encode(vin.get_txid()),
                        vin.get_vout()
                    );
                    return false;
                }
            };

            if !vin.uses_key(prev_output.get_pub_key_hash()) {
                warn!("Input {idx} public key does not match the output's locking hash");
                return false;
            }

            let digest = match Self::signing_digest(&mut tx_copy, idx, prev_output.get_pub_key_hash())
            {
                Ok(digest) => digest,
                Err(e) => {
                    warn!("Could not compute signing digest for input {idx}: {e}");
                    return false;
                }
            };

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                digest.as_slice(),
            ) {
                return false;
            }
        }
        true
    }

    /// Sum of the outputs this transaction spends. `None` when a reference
    /// is missing from `prev_txs` or the sum overflows.
    pub fn input_total(&self, prev_txs: &HashMap<String, Transaction>) -> Option<u64> {
        self.vin.iter().try_fold(0u64, |total, input| {
            total.checked_add(Self::referenced_output(input, prev_txs)?.get_value())
        })
    }

    /// `None` when the outputs do not fit in a `u64`.
    pub fn output_total(&self) -> Option<u64> {
        self.vout
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.get_value()))
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// Content hash over inputs and outputs with the id field cleared.
    ///
    /// Signatures and public keys of spending inputs are left out, so signing
    /// does not change the id. A coinbase keeps its data in the hash.
    pub fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = if self.is_coinbase() {
            Transaction {
                id: vec![],
                vin: self.vin.clone(),
                vout: self.vout.clone(),
            }
        } else {
            Transaction {
                id: vec![],
                ..self.trimmed_copy()
            }
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: Vec<u8>) -> Transaction {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    const GENESIS_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

    fn funding_tx(owner: &Wallet, values: &[u64]) -> Transaction {
        let outputs = values
            .iter()
            .map(|v| TXOutput::new_with_hash(*v, hash_pub_key(owner.get_public_key())))
            .collect();
        Transaction::from_parts(
            vec![TXInput {
                txid: vec![],
                vout: COINBASE_VOUT,
                signature: b"funding".to_vec(),
                pub_key: vec![],
            }],
            outputs,
        )
        .unwrap()
    }

    fn prev_map(txs: &[&Transaction]) -> HashMap<String, Transaction> {
        txs.iter()
            .map(|tx| (HEXLOWER.encode(tx.get_id()), (*tx).clone()))
            .collect()
    }

    fn spend(prev: &Transaction, indices: &[usize], to: &Wallet, value: u64) -> Transaction {
        let vin = indices
            .iter()
            .map(|i| TXInput::new(prev.get_id(), *i))
            .collect();
        let vout = vec![TXOutput::new_with_hash(
            value,
            hash_pub_key(to.get_public_key()),
        )];
        Transaction::from_parts(vin, vout).unwrap()
    }

    #[test]
    fn test_coinbase_shape() {
        let tx = Transaction::new_coinbase_tx(GENESIS_ADDRESS, "genesis").unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin()[0].get_vout(), COINBASE_VOUT);
        assert!(tx.get_vin()[0].get_txid().is_empty());
        assert_eq!(tx.get_vout().len(), 1);
        assert_eq!(tx.get_vout()[0].get_value(), COINBASE_REWARD);
        assert_eq!(tx.get_id(), tx.hash().unwrap().as_slice());
        assert!(tx.verify(&HashMap::new()));
    }

    #[test]
    fn test_coinbase_ids_differ_without_data() {
        let a = Transaction::new_coinbase_tx(GENESIS_ADDRESS, "").unwrap();
        let b = Transaction::new_coinbase_tx(GENESIS_ADDRESS, "").unwrap();
        assert_ne!(a.get_id(), b.get_id());
    }

    #[test]
    fn test_coinbase_rejects_invalid_address() {
        let result = Transaction::new_coinbase_tx("definitely-not-base58-0OIl", "x");
        assert!(matches!(result, Err(LedgerError::InvalidAddress(_))));
    }

    #[test]
    fn test_id_ignores_id_field() {
        let mut tx = Transaction::new_coinbase_tx(GENESIS_ADDRESS, "genesis").unwrap();
        let original = tx.hash().unwrap();
        tx.id = vec![0xAA; 32];
        assert_eq!(tx.hash().unwrap(), original);
    }

    #[test]
    fn test_sign_then_verify() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[30, 70]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0, 1], &bob, 100);
        tx.sign(&alice, &prev).unwrap();

        assert!(!tx.is_coinbase());
        assert!(tx.verify(&prev));
        assert!(tx.get_vin().iter().all(|i| !i.get_signature().is_empty()));
    }

    #[test]
    fn test_signing_keeps_id_equal_to_content_hash() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[40]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &bob, 40);
        let unsigned_id = tx.get_id().to_vec();
        tx.sign(&alice, &prev).unwrap();

        assert_eq!(tx.get_id(), unsigned_id.as_slice());
        assert_eq!(tx.hash().unwrap(), unsigned_id);
    }

    #[test]
    fn test_verify_fails_when_id_is_replaced() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[40]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &bob, 40);
        tx.sign(&alice, &prev).unwrap();
        let tx = tx.with_id(funding.get_id().to_vec());

        assert!(!tx.verify(&prev));
    }

    #[test]
    fn test_verify_fails_for_wrong_signer() {
        let alice = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &mallory, 50);
        tx.sign(&mallory, &prev).unwrap();

        // mallory's key does not hash to the output's locking condition
        assert!(!tx.verify(&prev));
    }

    #[test]
    fn test_verify_fails_when_outputs_are_altered() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &bob, 50);
        tx.sign(&alice, &prev).unwrap();
        tx.vout[0].value = 5_000;

        assert!(!tx.verify(&prev));
    }

    #[test]
    fn test_signature_cannot_be_spliced_onto_other_output() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50, 50]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &bob, 50);
        tx.sign(&alice, &prev).unwrap();
        tx.vin[0].vout = 1;

        assert!(!tx.verify(&prev));
    }

    #[test]
    fn test_verify_returns_false_for_unknown_prior_transaction() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50]);
        let prev = prev_map(&[&funding]);

        let mut tx = spend(&funding, &[0], &bob, 50);
        tx.sign(&alice, &prev).unwrap();

        assert!(!tx.verify(&HashMap::new()));
    }

    #[test]
    fn test_sign_rejects_transaction_without_inputs() {
        let alice = Wallet::new().unwrap();
        let mut tx = Transaction::from_parts(
            vec![],
            vec![TXOutput::new_with_hash(1, hash_pub_key(alice.get_public_key()))],
        )
        .unwrap();

        let result = tx.sign(&alice, &HashMap::new());
        assert!(matches!(result, Err(LedgerError::Transaction(_))));
        assert!(!tx.verify(&HashMap::new()));
    }

    #[test]
    fn test_sign_reports_missing_prior_transaction() {
        let alice = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50]);
        let mut tx = spend(&funding, &[0], &alice, 50);

        let result = tx.sign(&alice, &HashMap::new());
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_input_with_real_reference_is_not_coinbase() {
        let alice = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[50]);
        let tx = spend(&funding, &[0], &alice, 50);
        assert!(!tx.is_coinbase());
        assert_eq!(tx.get_vin()[0].output_index(), Some(0));

        let marker = TXInput {
            vout: COINBASE_VOUT,
            ..Default::default()
        };
        assert_eq!(marker.output_index(), None);
    }

    #[test]
    fn test_value_totals() {
        let alice = Wallet::new().unwrap();
        let funding = funding_tx(&alice, &[30, 70, u64::MAX]);
        let prev = prev_map(&[&funding]);

        assert_eq!(spend(&funding, &[0, 1], &alice, 1).input_total(&prev), Some(100));
        assert_eq!(spend(&funding, &[1, 2], &alice, 1).input_total(&prev), None);
        assert_eq!(spend(&funding, &[0], &alice, 1).input_total(&HashMap::new()), None);

        assert_eq!(funding_tx(&alice, &[30, 70]).output_total(), Some(100));
        assert_eq!(funding_tx(&alice, &[u64::MAX, 1]).output_total(), None);
    }
}

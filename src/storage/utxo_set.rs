use crate::core::{Block, Ledger, TXOutput, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use std::collections::{HashMap, HashSet};

/// Key prefix of UTXO entries, kept apart from raw block-hash keys.
pub const UTXO_PREFIX: &[u8] = b"utxo-";

/// One still-unspent output, tagged with its position in the creating
/// transaction so later inputs can find it after siblings are spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnspentOutput {
    index: usize,
    output: TXOutput,
}

impl UnspentOutput {
    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn get_output(&self) -> &TXOutput {
        &self.output
    }
}

fn utxo_key(txid: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(UTXO_PREFIX.len() + txid.len());
    key.extend_from_slice(UTXO_PREFIX);
    key.extend_from_slice(txid);
    key
}

fn fresh_entry(tx: &Transaction) -> Vec<UnspentOutput> {
    tx.get_vout()
        .iter()
        .enumerate()
        .map(|(index, output)| UnspentOutput {
            index,
            output: output.clone(),
        })
        .collect()
}

/// Index of currently spendable outputs, derived from the ledger.
pub struct UTXOSet<'a> {
    ledger: &'a Ledger,
}

impl<'a> UTXOSet<'a> {
    pub fn new(ledger: &'a Ledger) -> UTXOSet<'a> {
        UTXOSet { ledger }
    }

    pub fn get_ledger(&self) -> &Ledger {
        self.ledger
    }

    /// Greedy selection in storage order, stopping once `amount` is covered.
    /// Returns whatever was gathered even when it falls short, as
    /// `(hex txid, output indices)` pairs in the order they were picked.
    /// Output indices are positions in the original transaction.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, Vec<(String, Vec<usize>)>)> {
        let mut unspent_outputs: Vec<(String, Vec<usize>)> = vec![];
        let mut accumulated: u64 = 0;

        for item in self.ledger.get_db().scan_prefix(UTXO_PREFIX) {
            let (key, value) = item?;
            let outs: Vec<UnspentOutput> = deserialize(value.as_ref())?;

            let mut picked = vec![];
            for out in outs {
                if accumulated >= amount {
                    break;
                }
                if out.output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(out.output.get_value());
                    picked.push(out.index);
                }
            }
            if !picked.is_empty() {
                unspent_outputs.push((HEXLOWER.encode(&key[UTXO_PREFIX.len()..]), picked));
            }
            if accumulated >= amount {
                break;
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn find_unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        for item in self.ledger.get_db().scan_prefix(UTXO_PREFIX) {
            let (_, value) = item?;
            let outs: Vec<UnspentOutput> = deserialize(value.as_ref())?;
            utxos.extend(
                outs.into_iter()
                    .filter(|out| out.output.is_locked_with_key(pub_key_hash))
                    .map(|out| out.output),
            );
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        self.find_unspent_outputs(pub_key_hash)?
            .iter()
            .try_fold(0u64, |total, out| total.checked_add(out.get_value()))
            .ok_or_else(|| {
                LedgerError::Integrity("Unspent balance does not fit in a u64".to_string())
            })
    }

    /// Number of transactions that still have at least one unspent output.
    pub fn count_transactions(&self) -> Result<usize> {
        let mut counter = 0;
        for item in self.ledger.get_db().scan_prefix(UTXO_PREFIX).keys() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Stored entry for one transaction, if any of its outputs are unspent.
    pub fn get_entry(&self, txid: &[u8]) -> Result<Option<Vec<UnspentOutput>>> {
        match self.ledger.get_db().get(utxo_key(txid))? {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Rebuilds the index by replaying the whole ledger.
    ///
    /// The old entries are dropped and the new ones written in a single
    /// batch, so a crash leaves either the previous index or the rebuilt one.
    /// Returns the number of entries written.
    pub fn reindex(&self) -> Result<usize> {
        let db = self.ledger.get_db();

        let mut spent: HashMap<Vec<u8>, HashSet<i64>> = HashMap::new();
        for block in self.ledger.iterator() {
            for tx in block?.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for input in tx.get_vin() {
                    spent
                        .entry(input.get_txid().to_vec())
                        .or_default()
                        .insert(input.get_vout());
                }
            }
        }

        let mut batch = sled::Batch::default();
        for key in db.scan_prefix(UTXO_PREFIX).keys() {
            batch.remove(key?);
        }

        let mut written = 0;
        for block in self.ledger.iterator() {
            for tx in block?.get_transactions() {
                let spent_indices = spent.get(tx.get_id());
                let unspent: Vec<UnspentOutput> = fresh_entry(tx)
                    .into_iter()
                    .filter(|out| {
                        !spent_indices.is_some_and(|indices| indices.contains(&(out.index as i64)))
                    })
                    .collect();
                if unspent.is_empty() {
                    continue;
                }
                batch.insert(utxo_key(tx.get_id()), serialize(&unspent)?);
                written += 1;
            }
        }

        db.apply_batch(batch)?;
        db.flush()?;
        info!("Reindexed UTXO set: {written} transactions with unspent outputs");
        Ok(written)
    }

    /// Applies one freshly appended block: consumes the outputs its inputs
    /// spend and records every output it creates.
    ///
    /// Runs as one store transaction. An input pointing at an output that is
    /// not in the index fails with `NotFound` and leaves the index untouched,
    /// which is also what applying the same block twice runs into.
    pub fn update(&self, block: &Block) -> Result<()> {
        let db = self.ledger.get_db();

        let result: TransactionResult<(), LedgerError> = db.transaction(|tx_db| {
            for tx in block.get_transactions() {
                if !tx.is_coinbase() {
                    for vin in tx.get_vin() {
                        let key = utxo_key(vin.get_txid());
                        let missing = || {
                            ConflictableTransactionError::Abort(LedgerError::NotFound(format!(
                                "Unspent output {}:{}",
                                HEXLOWER.encode(vin.get_txid()),
                                vin.get_vout()
                            )))
                        };

                        let outs_bytes = tx_db.get(key.as_slice())?.ok_or_else(missing)?;
                        let mut outs: Vec<UnspentOutput> = deserialize(outs_bytes.as_ref())
                            .map_err(ConflictableTransactionError::Abort)?;
                        let position = vin
                            .output_index()
                            .and_then(|index| outs.iter().position(|out| out.index == index))
                            .ok_or_else(missing)?;
                        outs.remove(position);

                        if outs.is_empty() {
                            tx_db.remove(key)?;
                        } else {
                            let bytes =
                                serialize(&outs).map_err(ConflictableTransactionError::Abort)?;
                            tx_db.insert(key, bytes)?;
                        }
                    }
                }

                let bytes =
                    serialize(&fresh_entry(tx)).map_err(ConflictableTransactionError::Abort)?;
                tx_db.insert(utxo_key(tx.get_id()), bytes)?;
            }
            Ok(())
        });
        result?;

        debug!("Applied block {} to UTXO set", block.get_hash_hex());
        Ok(())
    }
}

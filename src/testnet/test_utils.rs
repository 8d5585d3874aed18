//! Test utilities for ledger testing

use crate::core::{Block, Ledger, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::wallet::Wallet;
use tempfile::TempDir;

/// Low enough that each block mines in a few hundred hashes.
pub const TEST_DIFFICULTY: u32 = 8;

pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| LedgerError::Io(e.to_string()))
}

/// Creates an indexed ledger in a temporary directory whose genesis reward
/// belongs to the returned wallet. Keep the `TempDir` alive for the test.
pub fn create_test_ledger() -> Result<(Ledger, Wallet, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let genesis_wallet = Wallet::new()?;
    let coinbase = Transaction::new_coinbase_tx(&genesis_wallet.get_address(), "test genesis")?;
    let ledger = Ledger::initialize(
        temp_dir.path().join("test_ledger"),
        &coinbase,
        TEST_DIFFICULTY,
    )?;
    UTXOSet::new(&ledger).reindex()?;
    Ok((ledger, genesis_wallet, temp_dir))
}

/// Builds a transfer, mines it alone into a block and applies the block to
/// the index.
pub fn transfer(ledger: &mut Ledger, from: &Wallet, to: &str, amount: u64) -> Result<Block> {
    let tx = Transaction::new_utxo_transaction(from, to, amount, &UTXOSet::new(ledger))?;
    mine_and_index(ledger, &[tx])
}

/// Like [`transfer`], with a coinbase paying `miner` placed first in the block.
pub fn transfer_with_reward(
    ledger: &mut Ledger,
    from: &Wallet,
    to: &str,
    amount: u64,
    miner: &str,
) -> Result<Block> {
    let tx = Transaction::new_utxo_transaction(from, to, amount, &UTXOSet::new(ledger))?;
    let coinbase = Transaction::new_coinbase_tx(miner, "")?;
    mine_and_index(ledger, &[coinbase, tx])
}

pub fn mine_and_index(ledger: &mut Ledger, transactions: &[Transaction]) -> Result<Block> {
    let block = ledger.append_block(transactions)?;
    UTXOSet::new(ledger).update(&block)?;
    Ok(block)
}

// The append-only chain of mined blocks, persisted in sled.
// Block records live under their raw 32-byte hash, the current tip under "lh"
// and the chain's fixed difficulty under "difficulty".

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, ProofOfWork, Signer, Transaction, COINBASE_REWARD};
use crate::error::{LedgerError, Result};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use sled::transaction::TransactionResult;
use sled::Db;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const TIP_HASH_KEY: &str = "lh";
pub const DIFFICULTY_KEY: &str = "difficulty";
const GENESIS_DATA: &str = "First Transaction from Genesis";

/// Handle on an open ledger. Dropping it closes the store.
pub struct Ledger {
    tip_hash: Vec<u8>,
    db: Db,
    db_path: PathBuf,
    difficulty: u32,
}

/// What an audit pass reports for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub hash: String,
    pub pre_block_hash: String,
    pub nonce: i64,
    pub difficulty: u32,
    pub transaction_count: usize,
    pub pow_valid: bool,
}

impl Ledger {
    /// Creates a new ledger at the configured location, paying the genesis
    /// reward to `genesis_address`.
    pub fn create_blockchain(genesis_address: &str) -> Result<Ledger> {
        let coinbase = Transaction::new_coinbase_tx(genesis_address, GENESIS_DATA)?;
        Self::initialize(
            GLOBAL_CONFIG.get_data_dir(),
            &coinbase,
            GLOBAL_CONFIG.get_difficulty()?,
        )
    }

    /// Opens the ledger at the configured location.
    pub fn open_default() -> Result<Ledger> {
        Self::open(GLOBAL_CONFIG.get_data_dir())
    }

    /// Mines the genesis block and fixes `difficulty` for the life of the
    /// chain.
    pub fn initialize<P: AsRef<Path>>(
        db_path: P,
        genesis_coinbase: &Transaction,
        difficulty: u32,
    ) -> Result<Ledger> {
        let path = db_path.as_ref().to_path_buf();
        if !genesis_coinbase.is_coinbase() {
            return Err(LedgerError::Transaction(
                "Genesis block must be built from a coinbase transaction".to_string(),
            ));
        }

        let db = sled::open(&path)?;
        if db.contains_key(TIP_HASH_KEY)? {
            return Err(LedgerError::Config(format!(
                "Ledger already exists at {}",
                path.display()
            )));
        }

        let genesis = Block::generate_genesis_block(genesis_coinbase, difficulty)?;
        Self::persist_block(&db, &genesis, Some(difficulty))?;
        info!(
            "Genesis block created at difficulty {difficulty}: {}",
            genesis.get_hash_hex()
        );

        Ok(Ledger {
            tip_hash: genesis.get_hash().to_vec(),
            db,
            db_path: path,
            difficulty,
        })
    }

    /// Opens an existing ledger. Blocks appended from here on are mined at
    /// the difficulty recorded when the chain was created.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Ledger> {
        let path = db_path.as_ref().to_path_buf();
        let missing = || {
            LedgerError::Config(format!(
                "No existing ledger found at {}. Create one first.",
                path.display()
            ))
        };
        if !path.exists() {
            return Err(missing());
        }

        let db = sled::open(&path)?;
        let tip_hash = db.get(TIP_HASH_KEY)?.ok_or_else(missing)?.to_vec();
        let difficulty_bytes = db.get(DIFFICULTY_KEY)?.ok_or_else(|| {
            LedgerError::Config(format!("Ledger at {} has no difficulty recorded", path.display()))
        })?;
        let difficulty = <[u8; 4]>::try_from(difficulty_bytes.as_ref())
            .map(u32::from_be_bytes)
            .map_err(|_| {
                LedgerError::Serialization(format!(
                    "Malformed difficulty record in {}",
                    path.display()
                ))
            })?;
        debug!(
            "Opened ledger at {} with tip {} at difficulty {difficulty}",
            path.display(),
            HEXLOWER.encode(&tip_hash)
        );

        Ok(Ledger {
            tip_hash,
            db,
            db_path: path,
            difficulty,
        })
    }

    /// Flushes pending writes and releases the store.
    pub fn close(self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // Block record and tip (plus the difficulty, for genesis) move together
    // or not at all.
    fn persist_block(db: &Db, block: &Block, chain_difficulty: Option<u32>) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        let result: TransactionResult<(), LedgerError> = db.transaction(|tx_db| {
            tx_db.insert(block_hash, block_data.as_slice())?;
            tx_db.insert(TIP_HASH_KEY, block_hash)?;
            if let Some(difficulty) = chain_difficulty {
                tx_db.insert(DIFFICULTY_KEY, &difficulty.to_be_bytes()[..])?;
            }
            Ok(())
        });
        result?;
        db.flush()?;
        debug!("Persisted block {}", block.get_hash_hex());
        Ok(())
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub fn get_tip_hash(&self) -> &[u8] {
        self.tip_hash.as_slice()
    }

    /// The chain's fixed difficulty.
    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Mines `transactions` into a new block on top of the current tip.
    ///
    /// The batch is checked first. Every id must be the content hash of its
    /// transaction and must not already be taken. A coinbase may only come
    /// first and mints at most [`COINBASE_REWARD`]. Every other transaction
    /// must carry valid signatures and may not create more value than it
    /// spends. No output may be spent twice, whether inside the batch or
    /// already on the chain. Nothing is written when a check fails.
    pub fn append_block(&mut self, transactions: &[Transaction]) -> Result<Block> {
        self.validate_transactions(transactions)?;

        let tip_hash = self
            .db
            .get(TIP_HASH_KEY)?
            .ok_or_else(|| LedgerError::NotFound("Tip hash".to_string()))?
            .to_vec();

        let block = Block::new_block(tip_hash, transactions, self.difficulty)?;
        Self::persist_block(&self.db, &block, None)?;
        self.tip_hash = block.get_hash().to_vec();

        info!(
            "Appended block {} with {} transactions",
            block.get_hash_hex(),
            block.get_transactions().len()
        );
        Ok(block)
    }

    fn validate_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let mut spent_in_block: HashSet<(Vec<u8>, i64)> = HashSet::new();
        let mut ids_in_block: HashSet<Vec<u8>> = HashSet::new();

        for (index, transaction) in transactions.iter().enumerate() {
            let txid_hex = HEXLOWER.encode(transaction.get_id());
            if transaction.hash()? != transaction.get_id() {
                return Err(LedgerError::Integrity(format!(
                    "Transaction {index} ({txid_hex}) does not match its content hash"
                )));
            }
            if !ids_in_block.insert(transaction.get_id().to_vec()) {
                return Err(LedgerError::Integrity(format!(
                    "Transaction {index} ({txid_hex}) appears twice in this block"
                )));
            }

            let output_total = transaction.output_total();

            if transaction.is_coinbase() {
                if index != 0 {
                    return Err(LedgerError::Integrity(format!(
                        "Coinbase transaction at position {index}; only the first may mint"
                    )));
                }
                if !output_total.is_some_and(|total| total <= COINBASE_REWARD) {
                    return Err(LedgerError::Integrity(format!(
                        "Coinbase {txid_hex} mints more than {COINBASE_REWARD}"
                    )));
                }
                continue;
            }

            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_in_block.insert(output_reference) {
                    return Err(LedgerError::Integrity(format!(
                        "Double spend in transaction {index}: output {}:{} already spent in this block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }

            let prev_txs = self.collect_prior_transactions(transaction, &transactions[..index])?;
            if !transaction.verify(&prev_txs) {
                return Err(LedgerError::Integrity(format!(
                    "Signature verification failed for transaction {index} ({txid_hex})"
                )));
            }

            match (transaction.input_total(&prev_txs), output_total) {
                (Some(inputs), Some(outputs)) if outputs <= inputs => {}
                (inputs, outputs) => {
                    return Err(LedgerError::Integrity(format!(
                        "Transaction {index} ({txid_hex}) creates value: outputs {} exceed inputs {}",
                        outputs.map_or("overflow".to_string(), |v| v.to_string()),
                        inputs.map_or("overflow".to_string(), |v| v.to_string())
                    )));
                }
            }
        }

        self.check_chain_conflicts(&spent_in_block, &ids_in_block)
    }

    /// One pass over the chain looking for an output in `references` that an
    /// input already consumed, or a transaction already carrying one of `ids`.
    fn check_chain_conflicts(
        &self,
        references: &HashSet<(Vec<u8>, i64)>,
        ids: &HashSet<Vec<u8>>,
    ) -> Result<()> {
        for block in self.iterator() {
            for tx in block?.get_transactions() {
                if ids.contains(tx.get_id()) {
                    return Err(LedgerError::Integrity(format!(
                        "Transaction {} is already on the chain",
                        HEXLOWER.encode(tx.get_id())
                    )));
                }
                if tx.is_coinbase() {
                    continue;
                }
                for input in tx.get_vin() {
                    if references.contains(&(input.get_txid().to_vec(), input.get_vout())) {
                        return Err(LedgerError::Integrity(format!(
                            "Output {}:{} was already spent on the chain",
                            HEXLOWER.encode(input.get_txid()),
                            input.get_vout()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Walks the chain from the tip back to genesis.
    pub fn iterator(&self) -> LedgerIterator {
        LedgerIterator::new(self.tip_hash.clone(), self.db.clone())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self.db.get(block_hash)? {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Linear scan of every block, newest first.
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            let block = block?;
            if let Some(tx) = block
                .get_transactions()
                .iter()
                .find(|tx| tx.get_id() == txid)
            {
                return Ok(tx.clone());
            }
        }
        Err(LedgerError::NotFound(format!(
            "Transaction {}",
            HEXLOWER.encode(txid)
        )))
    }

    // Transactions referenced by `tx`'s inputs, looked up in `pending` first
    // and then on the chain. Unknown references are left out of the map.
    fn collect_prior_transactions(
        &self,
        tx: &Transaction,
        pending: &[Transaction],
    ) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in tx.get_vin() {
            let txid_hex = HEXLOWER.encode(input.get_txid());
            if prev_txs.contains_key(&txid_hex) {
                continue;
            }
            if let Some(prev) = pending.iter().find(|p| p.get_id() == input.get_txid()) {
                prev_txs.insert(txid_hex, prev.clone());
                continue;
            }
            match self.find_transaction(input.get_txid()) {
                Ok(prev) => {
                    prev_txs.insert(txid_hex, prev);
                }
                Err(LedgerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction<S: Signer + ?Sized>(
        &self,
        tx: &mut Transaction,
        signer: &S,
    ) -> Result<()> {
        let prev_txs = self.collect_prior_transactions(tx, &[])?;
        tx.sign(signer, &prev_txs)
    }

    /// Signature check against the chain. Unknown prior transactions make the
    /// result `false`; only storage failures are errors.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.collect_prior_transactions(tx, &[])?;
        Ok(tx.verify(&prev_txs))
    }

    /// Audits every block's proof of work against the chain's difficulty,
    /// newest first. A failing block is reported in its summary and the scan
    /// carries on.
    pub fn list_chain(&self) -> Result<Vec<BlockSummary>> {
        let mut summaries = vec![];
        for block in self.iterator() {
            let block = block?;
            let pow_valid = ProofOfWork::validate_at(&block, self.difficulty);
            if !pow_valid {
                warn!("Block {} failed proof-of-work validation", block.get_hash_hex());
            }
            summaries.push(BlockSummary {
                hash: block.get_hash_hex(),
                pre_block_hash: HEXLOWER.encode(block.get_pre_block_hash()),
                nonce: block.get_nonce(),
                difficulty: block.get_difficulty(),
                transaction_count: block.get_transactions().len(),
                pow_valid,
            });
        }
        Ok(summaries)
    }
}

/// Lazy tip-to-genesis cursor. Restart by asking the ledger for a new one.
pub struct LedgerIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl LedgerIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> LedgerIterator {
        LedgerIterator {
            current_hash: tip_hash,
            db,
        }
    }

    fn load_current(&self) -> Result<Block> {
        let data = self.db.get(&self.current_hash)?.ok_or_else(|| {
            LedgerError::NotFound(format!("Block {}", HEXLOWER.encode(&self.current_hash)))
        })?;
        Block::deserialize(data.as_ref())
    }
}

impl Iterator for LedgerIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        let result = self.load_current();
        match &result {
            Ok(block) => self.current_hash = block.get_pre_block_hash().to_vec(),
            Err(_) => self.current_hash.clear(),
        }
        Some(result)
    }
}

use crate::core::proof_of_work::{is_supported_difficulty, MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::error::{LedgerError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

pub const DEFAULT_DIFFICULTY: u32 = 16;

static DEFAULT_DATA_DIR: &str = "data/blocks";
static DEFAULT_WALLET_FILE: &str = "wallet.dat";

const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const WALLET_FILE_KEY: &str = "LEDGER_WALLET_FILE";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";

pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        for key in [DATA_DIR_KEY, WALLET_FILE_KEY, DIFFICULTY_KEY] {
            if let Ok(value) = env::var(key) {
                map.insert(String::from(key), value);
            }
        }
        Config {
            inner: RwLock::new(map),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(String::from(key), value);
    }

    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(
            self.get(DATA_DIR_KEY)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        )
    }

    pub fn set_data_dir(&self, dir: String) {
        self.set(DATA_DIR_KEY, dir);
    }

    pub fn get_wallet_file(&self) -> PathBuf {
        PathBuf::from(
            self.get(WALLET_FILE_KEY)
                .unwrap_or_else(|| DEFAULT_WALLET_FILE.to_string()),
        )
    }

    pub fn set_wallet_file(&self, path: String) {
        self.set(WALLET_FILE_KEY, path);
    }

    /// Number of leading zero bits a block hash must carry.
    pub fn get_difficulty(&self) -> Result<u32> {
        match self.get(DIFFICULTY_KEY) {
            None => Ok(DEFAULT_DIFFICULTY),
            Some(raw) => parse_difficulty(&raw),
        }
    }

    pub fn set_difficulty(&self, difficulty: u32) {
        self.set(DIFFICULTY_KEY, difficulty.to_string());
    }
}

fn parse_difficulty(raw: &str) -> Result<u32> {
    let difficulty: u32 = raw
        .trim()
        .parse()
        .map_err(|e| LedgerError::Config(format!("Invalid difficulty {raw:?}: {e}")))?;
    if !is_supported_difficulty(difficulty) {
        return Err(LedgerError::Config(format!(
            "Difficulty must be between {MIN_DIFFICULTY} and {MAX_DIFFICULTY}, got {difficulty}"
        )));
    }
    Ok(difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_config() -> Config {
        Config {
            inner: RwLock::new(HashMap::new()),
        }
    }

    #[test]
    fn test_defaults() {
        let config = empty_config();
        assert_eq!(config.get_data_dir(), PathBuf::from("data/blocks"));
        assert_eq!(config.get_wallet_file(), PathBuf::from("wallet.dat"));
        assert_eq!(config.get_difficulty().unwrap(), DEFAULT_DIFFICULTY);
    }

    #[test]
    fn test_overrides() {
        let config = empty_config();
        config.set_data_dir("/tmp/ledger".to_string());
        config.set_difficulty(8);
        assert_eq!(config.get_data_dir(), PathBuf::from("/tmp/ledger"));
        assert_eq!(config.get_difficulty().unwrap(), 8);
    }

    #[test]
    fn test_invalid_difficulty() {
        assert!(matches!(parse_difficulty("0"), Err(LedgerError::Config(_))));
        assert!(matches!(parse_difficulty("256"), Err(LedgerError::Config(_))));
        assert!(matches!(parse_difficulty("hard"), Err(LedgerError::Config(_))));
        assert_eq!(parse_difficulty(" 20 ").unwrap(), 20);
    }
}

//! Configuration management
//!
//! Where the ledger lives on disk, which wallet file to use and how hard
//! blocks are to mine. Values come from the environment and may be
//! overridden by command-line flags.

pub mod settings;

pub use settings::{Config, DEFAULT_DIFFICULTY, GLOBAL_CONFIG};

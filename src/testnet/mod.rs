//! Throwaway ledgers for unit tests.

pub mod test_utils;

pub use test_utils::*;

//! Error types for LedgerChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Block must contain at least one transaction")]
    EmptyBlock,
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Insufficient funds for {address}: requested {requested}, available {available}")]
    InsufficientFunds {
        address: String,
        requested: u64,
        available: u64,
    },
    #[error("Double spend detected: {0}")]
    DoubleSpend(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Key not found in store: {0}")]
    StoreNotFound(String),
    #[error("Store IO error: {0}")]
    StoreIo(String),
    #[error("Chain state corrupted: {0}")]
    StateCorruption(String),
    #[error("Mining was cancelled")]
    MiningCancelled,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// True for a missing key, as opposed to a fault in the store itself.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::StoreNotFound(_))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

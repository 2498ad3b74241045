//! Error types for the federator

use thiserror::Error;

/// Main error type for the federator
#[derive(Error, Debug)]
pub enum FederatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint {name} error: {message}")]
    Checkpoint { name: String, message: String },

    #[error("Chain connection error for {chain}: {message}")]
    ChainConnection { chain: String, message: String },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted { tx_hash: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Nonce error: {0}")]
    Nonce(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("A federator cycle is already running")]
    CycleInProgress,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FederatorError {
    /// Check if a broadcast may be repeated with the same signed payload
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FederatorError::ChainConnection { .. }
                | FederatorError::Timeout { .. }
                | FederatorError::Transaction(_)
        )
    }
}

impl From<ethers::abi::Error> for FederatorError {
    fn from(e: ethers::abi::Error) -> Self {
        FederatorError::Contract(e.to_string())
    }
}

/// Result type for federator operations
pub type FederatorResult<T> = Result<T, FederatorError>;

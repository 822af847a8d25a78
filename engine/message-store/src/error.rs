//! Error types for the message store

use fix_core::ConfigError;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in a message store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Durable backend could not be reached (fatal at construction)
    #[error("Backend unreachable: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// A single durable write or read failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or non-numeric stored data
    #[error("Format error: {0}")]
    Format(String),

    /// Missing or invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sequence numbers start at 1
    #[error("Invalid sequence number: {0}")]
    InvalidSeqNum(u64),

    /// Message body cannot be stored by this backend
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Operation on a closed store
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Create a new format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// True for errors that leave the durable backend unusable until reconnect
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

//! Error types for the audit log

use fix_core::ConfigError;
use thiserror::Error;

/// Result type alias for audit log construction
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors raised while opening audit logs
///
/// Writes never surface an error; only construction does.
#[derive(Error, Debug)]
pub enum LogError {
    /// Missing `FileLogPath`, unknown session and the like
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Creating the log directory or opening a log file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

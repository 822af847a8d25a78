//! Configuration errors

use thiserror::Error;

/// Result type alias for settings lookups
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while resolving session configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("Conditionally required field missing: {key}")]
    MissingSetting { key: String },

    /// A setting is present but cannot be interpreted
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidSetting { key: String, value: String, reason: String },

    /// Lookup for a session that was never configured
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Two session blocks resolved to the same identity
    #[error("Duplicate session: {0}")]
    DuplicateSession(String),
}

impl ConfigError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingSetting { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting { key: key.into(), value: value.into(), reason: reason.into() }
    }
}

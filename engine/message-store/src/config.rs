//! Configuration for the store backends

use crate::dialect::Dialect;
use fix_core::{keys, ConfigError, SessionSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default interval between durable writes of the target sequence number
pub const DEFAULT_TARGET_SEQNUM_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration for a [`crate::FileStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Directory holding the session files
    pub path: PathBuf,

    /// Whether to flush counters and bodies to disk on every write
    pub sync_on_write: bool,
}

impl FileStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), sync_on_write: false }
    }
}

/// Configuration for a [`crate::SqlStore`] that opens its own pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStoreConfig {
    /// Backend driver name (`postgres`, `sqlite`)
    pub driver: String,

    /// Connection URL handed to the driver
    pub data_source_name: String,

    /// Maximum lifetime of a pooled connection (`None` keeps connections forever)
    pub conn_max_lifetime: Option<Duration>,

    /// Minimum time between durable writes of the target sequence number
    pub target_seqnum_debounce: Duration,

    /// Pool size
    pub max_connections: u32,
}

impl SqlStoreConfig {
    pub fn new(driver: impl Into<String>, data_source_name: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            data_source_name: data_source_name.into(),
            conn_max_lifetime: None,
            target_seqnum_debounce: DEFAULT_TARGET_SEQNUM_DEBOUNCE,
            max_connections: 1,
        }
    }

    /// Resolve from session settings. `SQLStoreDriver` and
    /// `SQLStoreDataSourceName` are required; a zero `SQLStoreConnMaxLifetime`
    /// means unlimited.
    pub fn from_settings(settings: &SessionSettings, default_debounce: Duration) -> Result<Self, ConfigError> {
        let driver = settings.setting(keys::SQL_STORE_DRIVER)?;
        let data_source_name = settings.setting(keys::SQL_STORE_DATA_SOURCE_NAME)?;

        let conn_max_lifetime = if settings.has_setting(keys::SQL_STORE_CONN_MAX_LIFETIME) {
            Some(settings.duration_setting(keys::SQL_STORE_CONN_MAX_LIFETIME)?).filter(|d| !d.is_zero())
        } else {
            None
        };

        let target_seqnum_debounce = if settings.has_setting(keys::SQL_STORE_TARGET_SEQNUM_DEBOUNCE) {
            settings.duration_setting(keys::SQL_STORE_TARGET_SEQNUM_DEBOUNCE)?
        } else {
            default_debounce
        };

        let config = Self {
            driver: driver.to_string(),
            data_source_name: data_source_name.to_string(),
            conn_max_lifetime,
            target_seqnum_debounce,
            max_connections: 1,
        };
        config.dialect()?;
        Ok(config)
    }

    /// Dialect declared by the driver name
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        Dialect::from_driver(&self.driver)
            .ok_or_else(|| ConfigError::invalid(keys::SQL_STORE_DRIVER, &self.driver, "unsupported driver"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = SessionSettings::new()
            .with(keys::SQL_STORE_DRIVER, "postgres")
            .with(keys::SQL_STORE_DATA_SOURCE_NAME, "postgres://localhost/fix")
            .with(keys::SQL_STORE_CONN_MAX_LIFETIME, "14400s")
            .with(keys::SQL_STORE_TARGET_SEQNUM_DEBOUNCE, "2s");

        let config = SqlStoreConfig::from_settings(&settings, DEFAULT_TARGET_SEQNUM_DEBOUNCE).unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert_eq!(config.conn_max_lifetime, Some(Duration::from_secs(14400)));
        assert_eq!(config.target_seqnum_debounce, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_lifetime_means_unlimited() {
        let settings = SessionSettings::new()
            .with(keys::SQL_STORE_DRIVER, "sqlite3")
            .with(keys::SQL_STORE_DATA_SOURCE_NAME, "sqlite::memory:")
            .with(keys::SQL_STORE_CONN_MAX_LIFETIME, "0");

        let config = SqlStoreConfig::from_settings(&settings, Duration::ZERO).unwrap();
        assert_eq!(config.conn_max_lifetime, None);
        assert_eq!(config.target_seqnum_debounce, Duration::ZERO);
    }

    #[test]
    fn test_missing_and_unsupported_driver() {
        let settings = SessionSettings::new().with(keys::SQL_STORE_DATA_SOURCE_NAME, "x");
        assert!(matches!(
            SqlStoreConfig::from_settings(&settings, DEFAULT_TARGET_SEQNUM_DEBOUNCE),
            Err(ConfigError::MissingSetting { .. })
        ));

        let settings = settings.with(keys::SQL_STORE_DRIVER, "oracle");
        assert!(matches!(
            SqlStoreConfig::from_settings(&settings, DEFAULT_TARGET_SEQNUM_DEBOUNCE),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }
}

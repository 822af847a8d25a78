//! FIX Engine Library
//!
//! Engine-level configuration, diagnostic logging setup and the assembly of
//! per-session resources (message store, audit log, transport settings) from
//! the crates below it.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod session;

pub use config::{AuditConfig, AuditSink, EngineConfig, LoggingConfig, SettingValue, StoreBackend, StoreConfig};
pub use logging::initialize_logging_with_config;
pub use session::{Engine, SessionResources};

/// Load configuration from an optional TOML file and `FIXENGINE_*` variables
pub fn load_configuration(path: Option<&Path>) -> Result<EngineConfig> {
    config::load_config(path).context("Failed to load engine configuration")
}

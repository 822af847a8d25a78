//! Engine configuration management

use anyhow::{Context, Result};
use audit_log::RedactionPolicy;
use fix_core::{SessionSettings, Settings};
use fix_transport::{BackpressurePolicy, TransportConfig};
use message_store::Dialect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "FIXENGINE_CONFIG";

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Diagnostic logging configuration
    pub logging: LoggingConfig,

    /// Message store configuration
    pub store: StoreConfig,

    /// Connection channel sizes and backpressure
    pub transport: TransportConfig,

    /// Audit trail configuration
    pub audit: AuditConfig,

    /// Settings every session inherits
    pub global: BTreeMap<String, SettingValue>,

    /// One block per session
    pub sessions: Vec<BTreeMap<String, SettingValue>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Log file path (if None, logs to stdout)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

/// Which [`message_store::MessageStore`] backs every session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Sql,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "sql" => Ok(Self::Sql),
            other => Err(anyhow::anyhow!("Invalid store backend: {other}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::File => f.write_str("file"),
            Self::Sql => f.write_str("sql"),
        }
    }
}

/// Message store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Minimum interval between durable writes of the inbound sequence number
    pub target_seqnum_debounce_ms: u64,

    /// File backend: flush counters and bodies on every write
    pub sync_on_write: bool,

    /// SQL backend: driver of the pool shared by every session
    pub driver: Option<String>,

    /// SQL backend: connection URL of the shared pool. When unset every
    /// session opens its own pool from its `SQLStore*` settings.
    pub data_source_name: Option<String>,

    /// SQL backend: size of the shared pool
    pub max_connections: u32,

    /// SQL backend: create the tables on the shared pool at startup
    pub create_schema: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            target_seqnum_debounce_ms: message_store::DEFAULT_TARGET_SEQNUM_DEBOUNCE.as_millis() as u64,
            sync_on_write: false,
            driver: None,
            data_source_name: None,
            max_connections: 5,
            create_schema: false,
        }
    }
}

impl StoreConfig {
    pub fn target_seqnum_debounce(&self) -> Duration {
        Duration::from_millis(self.target_seqnum_debounce_ms)
    }

    /// Driver and URL of the shared pool, if one is configured
    pub fn shared_pool(&self) -> Option<(&str, &str)> {
        match (&self.driver, &self.data_source_name) {
            (Some(driver), Some(dsn)) => Some((driver.as_str(), dsn.as_str())),
            _ => None,
        }
    }
}

/// Where the audit trail goes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditSink {
    /// `FileLogPath` directories
    #[default]
    File,
    /// The diagnostic `tracing` output
    Tracing,
    /// Discard
    Null,
}

impl FromStr for AuditSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "tracing" => Ok(Self::Tracing),
            "null" | "none" => Ok(Self::Null),
            other => Err(anyhow::anyhow!("Invalid audit sink: {other}")),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// When false nothing is recorded, whatever the sink
    pub enabled: bool,

    pub sink: AuditSink,

    /// Replace SOH with this character in the message log
    pub display_delimiter: Option<char>,

    /// Filtered message types and masked tags
    pub redaction: RedactionPolicy,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true, sink: AuditSink::File, display_delimiter: None, redaction: RedactionPolicy::default() }
    }
}

impl AuditConfig {
    /// Sink actually used once `enabled` is taken into account
    pub fn effective_sink(&self) -> AuditSink {
        if self.enabled {
            self.sink
        } else {
            AuditSink::Null
        }
    }

    pub fn display_delimiter_byte(&self) -> Option<u8> {
        self.display_delimiter.and_then(|c| u8::try_from(c).ok())
    }
}

/// A setting written in TOML as a string, integer or boolean
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Flag(true) => f.write_str("Y"),
            Self::Flag(false) => f.write_str("N"),
        }
    }
}

fn to_session_settings(block: &BTreeMap<String, SettingValue>) -> SessionSettings {
    let mut settings = SessionSettings::new();
    for (key, value) in block {
        settings.set(key.clone(), value.to_string());
    }
    settings
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from file: {:?}", path);
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
        Self::from_toml_str(&text).with_context(|| format!("Failed to parse configuration file: {:?}", path))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FIXENGINE_*` variables found by `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("FIXENGINE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("FIXENGINE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(file) = lookup("FIXENGINE_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }

        if let Some(backend) = lookup("FIXENGINE_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }

        if let Some(driver) = lookup("FIXENGINE_SQL_DRIVER") {
            self.store.driver = Some(driver);
        }

        if let Some(dsn) = lookup("FIXENGINE_SQL_DSN") {
            self.store.data_source_name = Some(dsn);
        }

        if let Some(ms) = lookup("FIXENGINE_TARGET_SEQNUM_DEBOUNCE_MS") {
            self.store.target_seqnum_debounce_ms =
                ms.trim().parse().with_context(|| format!("Invalid FIXENGINE_TARGET_SEQNUM_DEBOUNCE_MS: {ms}"))?;
        }

        if let Some(capacity) = lookup("FIXENGINE_INBOUND_CAPACITY") {
            self.transport.inbound_capacity =
                capacity.trim().parse().with_context(|| format!("Invalid FIXENGINE_INBOUND_CAPACITY: {capacity}"))?;
        }

        if let Some(policy) = lookup("FIXENGINE_BACKPRESSURE") {
            self.transport.backpressure = policy.parse::<BackpressurePolicy>().map_err(|e| anyhow::anyhow!(e))?;
        }

        if let Some(sink) = lookup("FIXENGINE_AUDIT_SINK") {
            self.audit.sink = sink.parse()?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level)),
        }

        // Validate log format
        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            _ => return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format)),
        }

        self.transport.validate().context("Invalid transport configuration")?;

        // Shared pool needs both halves
        match (&self.store.driver, &self.store.data_source_name) {
            (Some(driver), Some(_)) => {
                if Dialect::from_driver(driver).is_none() {
                    return Err(anyhow::anyhow!("Unsupported SQL driver: {driver}"));
                }
            }
            (None, None) => {}
            _ => return Err(anyhow::anyhow!("store.driver and store.data_source_name must be set together")),
        }

        if self.store.max_connections == 0 {
            return Err(anyhow::anyhow!("store.max_connections must be greater than 0"));
        }

        if self.store.create_schema && self.store.shared_pool().is_none() {
            return Err(anyhow::anyhow!("store.create_schema requires a shared pool"));
        }

        if let Some(c) = self.audit.display_delimiter {
            if !c.is_ascii() {
                return Err(anyhow::anyhow!("audit.display_delimiter must be ASCII, got {c:?}"));
            }
        }

        self.settings()?;
        Ok(())
    }

    /// Resolve the `[global]` and `[[sessions]]` tables
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::with_global(to_session_settings(&self.global));
        for (index, block) in self.sessions.iter().enumerate() {
            settings
                .add_session(to_session_settings(block))
                .with_context(|| format!("Invalid session block #{}", index + 1))?;
        }
        Ok(settings)
    }
}

/// Load configuration from an optional file and the process environment
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    // Override with environment variables
    config.apply_env_overrides(|key| std::env::var(key).ok())?;

    // Validate configuration
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fix_core::SessionID;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[logging]
level = "debug"
format = "json"

[store]
backend = "sql"
driver = "sqlite"
data_source_name = "sqlite::memory:"
max_connections = 1
create_schema = true
target_seqnum_debounce_ms = 250

[transport]
inbound_capacity = 64
backpressure = "drop-newest"

[audit]
sink = "tracing"
display_delimiter = "|"

[audit.redaction]
filtered_msg_types = ["W"]
redact_incoming = true

[audit.redaction.rules]
D = [467]

[global]
BeginString = "FIX.4.4"
SenderCompID = "ENGINE"
InboundChannelCapacity = 32

[[sessions]]
TargetCompID = "VENUE1"

[[sessions]]
TargetCompID = "VENUE2"
SessionQualifier = "md"
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.target_seqnum_debounce(), Duration::from_millis(500));
        assert_eq!(config.audit.effective_sink(), AuditSink::File);
    }

    #[test]
    fn test_parse_sample() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.store.backend, StoreBackend::Sql);
        assert_eq!(config.store.shared_pool(), Some(("sqlite", "sqlite::memory:")));
        assert_eq!(config.transport.inbound_capacity, 64);
        assert_eq!(config.transport.outbound_capacity, TransportConfig::default().outbound_capacity);
        assert_eq!(config.transport.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(config.audit.display_delimiter_byte(), Some(b'|'));
        assert!(config.audit.redaction.redact_incoming);
        assert!(config.audit.redaction.is_filtered("W"));
        assert!(!config.audit.redaction.is_filtered("X"));
    }

    #[test]
    fn test_sessions_inherit_global_block() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.session_settings().len(), 2);

        let venue2 = SessionID::new("FIX.4.4", "ENGINE", "VENUE2").with_qualifier("md");
        let session = settings.session(&venue2).unwrap();
        assert_eq!(session.setting("InboundChannelCapacity").unwrap(), "32");
    }

    #[test]
    fn test_setting_values_render_as_strings() {
        assert_eq!(SettingValue::Integer(30).to_string(), "30");
        assert_eq!(SettingValue::Flag(true).to_string(), "Y");
        assert_eq!(SettingValue::Flag(false).to_string(), "N");
        assert_eq!(SettingValue::Text("FIX.4.2".into()).to_string(), "FIX.4.2");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FIXENGINE_LOG_LEVEL", "warn"),
            ("FIXENGINE_STORE_BACKEND", "file"),
            ("FIXENGINE_TARGET_SEQNUM_DEBOUNCE_MS", "0"),
            ("FIXENGINE_BACKPRESSURE", "drop"),
            ("FIXENGINE_AUDIT_SINK", "null"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.target_seqnum_debounce(), Duration::ZERO);
        assert_eq!(config.transport.backpressure, BackpressurePolicy::DropNewest);
        assert_eq!(config.audit.sink, AuditSink::Null);
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut config = EngineConfig::default();
        let result = config.apply_env_overrides(|key| {
            (key == "FIXENGINE_INBOUND_CAPACITY").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = EngineConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.store.driver = Some("sqlite".to_string());
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.store.driver = Some("oracle".to_string());
        config.store.data_source_name = Some("oracle://db".to_string());
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.store.create_schema = true;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.transport.inbound_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.audit.display_delimiter = Some('¦');
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_session_rejected() {
        let text = r#"
[global]
BeginString = "FIX.4.4"
SenderCompID = "ENGINE"
TargetCompID = "VENUE"

[[sessions]]

[[sessions]]
"#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[logging]\nformat = \"compact\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.logging.format, "compact");

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}

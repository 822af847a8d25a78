//! Resolved session settings
//!
//! Settings arrive here already parsed: one global block plus one block per
//! session, each a flat set of key/value strings. Session blocks inherit any
//! key they do not set from the global block.

use crate::error::{ConfigError, Result};
use crate::keys;
use crate::session_id::SessionID;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Key/value options for one session (or the global defaults)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    values: BTreeMap<String, String>,
}

impl SessionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style variant of [`SessionSettings::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn has_setting(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get a required string setting
    pub fn setting(&self, key: &str) -> Result<&str> {
        self.values.get(key).map(String::as_str).ok_or_else(|| ConfigError::missing(key))
    }

    /// Get an optional string setting, empty when absent
    pub fn setting_or_empty(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn int_setting(&self, key: &str) -> Result<i64> {
        let value = self.setting(key)?;
        value.trim().parse().map_err(|e: std::num::ParseIntError| {
            ConfigError::invalid(key, value, e.to_string())
        })
    }

    pub fn bool_setting(&self, key: &str) -> Result<bool> {
        let value = self.setting(key)?;
        match value.trim() {
            "Y" | "y" | "true" | "TRUE" | "1" => Ok(true),
            "N" | "n" | "false" | "FALSE" | "0" => Ok(false),
            other => Err(ConfigError::invalid(key, other, "expected Y or N")),
        }
    }

    pub fn duration_setting(&self, key: &str) -> Result<Duration> {
        let value = self.setting(key)?;
        parse_duration(value).map_err(|reason| ConfigError::invalid(key, value, reason))
    }

    /// Fill every key this block does not set from `defaults`
    pub fn overlay(&mut self, defaults: &SessionSettings) {
        for (key, value) in &defaults.values {
            self.values.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Derive the session identity from the identity keys
    pub fn session_id(&self) -> Result<SessionID> {
        Ok(SessionID {
            begin_string: self.setting(keys::BEGIN_STRING)?.to_string(),
            sender_comp_id: self.setting(keys::SENDER_COMP_ID)?.to_string(),
            sender_sub_id: self.setting_or_empty(keys::SENDER_SUB_ID).to_string(),
            sender_location_id: self.setting_or_empty(keys::SENDER_LOCATION_ID).to_string(),
            target_comp_id: self.setting(keys::TARGET_COMP_ID)?.to_string(),
            target_sub_id: self.setting_or_empty(keys::TARGET_SUB_ID).to_string(),
            target_location_id: self.setting_or_empty(keys::TARGET_LOCATION_ID).to_string(),
            qualifier: self.setting_or_empty(keys::SESSION_QUALIFIER).to_string(),
        })
    }
}

/// Global defaults plus every configured session
#[derive(Debug, Clone, Default)]
pub struct Settings {
    global: SessionSettings,
    sessions: HashMap<SessionID, SessionSettings>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(global: SessionSettings) -> Self {
        Self { global, sessions: HashMap::new() }
    }

    pub fn global_settings(&self) -> &SessionSettings {
        &self.global
    }

    pub fn global_settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.global
    }

    /// Register a session block. Missing keys are inherited from the global
    /// block before the identity is resolved.
    pub fn add_session(&mut self, mut session: SessionSettings) -> Result<SessionID> {
        session.overlay(&self.global);
        let session_id = session.session_id()?;
        if self.sessions.contains_key(&session_id) {
            return Err(ConfigError::DuplicateSession(session_id.to_string()));
        }
        self.sessions.insert(session_id.clone(), session);
        Ok(session_id)
    }

    pub fn session_settings(&self) -> &HashMap<SessionID, SessionSettings> {
        &self.sessions
    }

    /// Settings for one session, or `UnknownSession`
    pub fn session(&self, session_id: &SessionID) -> Result<&SessionSettings> {
        self.sessions.get(session_id).ok_or_else(|| ConfigError::UnknownSession(session_id.to_string()))
    }
}

/// Parse `<n>` (seconds) or `<n>ms`, `<n>s`, `<n>m`, `<n>h`.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    if digits.is_empty() {
        return Err("expected a number".to_string());
    }
    let n: u64 = digits.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    let secs = |scale: u64| {
        n.checked_mul(scale).map(Duration::from_secs).ok_or_else(|| format!("duration {value:?} is too large"))
    };
    match unit {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => secs(60),
        "h" => secs(3600),
        other => Err(format!("unknown duration unit {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn session_block(target: &str) -> SessionSettings {
        SessionSettings::new().with(keys::BEGIN_STRING, "FIX.4.1").with(keys::TARGET_COMP_ID, target)
    }

    #[test]
    fn test_session_inherits_global_values() {
        let global = SessionSettings::new().with(keys::SENDER_COMP_ID, "TW").with(keys::FILE_LOG_PATH, ".");
        let mut settings = Settings::with_global(global);

        let id = settings.add_session(session_block("ARCA").with(keys::FILE_LOG_PATH, "mydir")).unwrap();

        assert_eq!(id, SessionID::new("FIX.4.1", "TW", "ARCA"));
        let session = settings.session(&id).unwrap();
        assert_eq!(session.setting(keys::FILE_LOG_PATH).unwrap(), "mydir");
        assert_eq!(session.setting(keys::SENDER_COMP_ID).unwrap(), "TW");
    }

    #[test]
    fn test_qualified_sessions_are_distinct() {
        let global = SessionSettings::new().with(keys::SENDER_COMP_ID, "TW");
        let mut settings = Settings::with_global(global);

        let plain = settings.add_session(session_block("ARCA")).unwrap();
        let qualified =
            settings.add_session(session_block("ARCA").with(keys::SESSION_QUALIFIER, "BS")).unwrap();

        assert_ne!(plain, qualified);
        assert_eq!(settings.session_settings().len(), 2);
        assert!(matches!(
            settings.add_session(session_block("ARCA")),
            Err(ConfigError::DuplicateSession(_))
        ));
    }

    #[test]
    fn test_missing_identity_key() {
        let mut settings = Settings::new();
        let err = settings.add_session(session_block("ARCA")).unwrap_err();
        assert_eq!(err, ConfigError::missing(keys::SENDER_COMP_ID));
    }

    #[test]
    fn test_unknown_session_lookup() {
        let settings = Settings::new();
        let id = SessionID::new("FIX.4.2", "A", "B");
        assert!(matches!(settings.session(&id), Err(ConfigError::UnknownSession(_))));
    }

    #[test]
    fn test_typed_settings() {
        let s = SessionSettings::new()
            .with("Capacity", "128")
            .with("Enabled", "Y")
            .with("Lifetime", "250ms")
            .with("Broken", "abc");

        assert_eq!(s.int_setting("Capacity").unwrap(), 128);
        assert!(s.bool_setting("Enabled").unwrap());
        assert_eq!(s.duration_setting("Lifetime").unwrap(), Duration::from_millis(250));
        assert!(matches!(s.int_setting("Broken"), Err(ConfigError::InvalidSetting { .. })));
        assert!(matches!(s.int_setting("Absent"), Err(ConfigError::MissingSetting { .. })));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert!(parse_duration("9999999999999999999h").is_err());
        assert!(parse_duration("9999999999999999999m").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
        assert_eq!(parse_duration(&format!("{}s", u64::MAX)).unwrap(), Duration::from_secs(u64::MAX));

        let s = SessionSettings::new().with("Lifetime", "9999999999999999999h");
        assert!(matches!(s.duration_setting("Lifetime"), Err(ConfigError::InvalidSetting { .. })));
    }

    proptest! {
        #[test]
        fn prop_millis_round_trip(n in 0u64..10_000_000) {
            prop_assert_eq!(parse_duration(&format!("{n}ms")).unwrap(), Duration::from_millis(n));
        }
    }
}

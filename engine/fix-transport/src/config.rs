//! Transport configuration

use crate::parser::DEFAULT_MAX_MESSAGE_SIZE;
use fix_core::{keys, ConfigError, SessionSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the read loop does when the inbound channel is full.
///
/// Either way the event is counted, logged and reported to the session's
/// audit event log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Wait for capacity; sequence numbers stay contiguous
    #[default]
    Block,
    /// Discard the message that did not fit (price feeds where staleness beats backlog)
    DropNewest,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop-newest" | "drop_newest" | "drop" => Ok(Self::DropNewest),
            other => Err(format!("unknown backpressure policy {other:?}, expected block or drop-newest")),
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::DropNewest => f.write_str("drop-newest"),
        }
    }
}

/// Channel sizes and policies for one connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of the inbound (parsed message) channel
    pub inbound_capacity: usize,

    /// Capacity of the outbound (raw bytes) channel
    pub outbound_capacity: usize,

    /// Behavior when the inbound channel is full
    pub backpressure: BackpressurePolicy,

    /// Frames larger than this end the connection
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
            outbound_capacity: 1024,
            backpressure: BackpressurePolicy::Block,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl TransportConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbound_capacity == 0 {
            return Err(ConfigError::invalid(keys::INBOUND_CHANNEL_CAPACITY, "0", "must be greater than 0"));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::invalid("outbound_capacity", "0", "must be greater than 0"));
        }
        if self.max_message_size < 32 {
            return Err(ConfigError::invalid(
                "max_message_size",
                self.max_message_size.to_string(),
                "too small for any FIX message",
            ));
        }
        Ok(())
    }

    /// Overlay `InboundChannelCapacity` and `InboundBackpressurePolicy` from
    /// session settings onto `self`
    pub fn with_session_settings(mut self, settings: &SessionSettings) -> Result<Self, ConfigError> {
        if settings.has_setting(keys::INBOUND_CHANNEL_CAPACITY) {
            let capacity = settings.int_setting(keys::INBOUND_CHANNEL_CAPACITY)?;
            self.inbound_capacity = usize::try_from(capacity).map_err(|_| {
                ConfigError::invalid(keys::INBOUND_CHANNEL_CAPACITY, capacity.to_string(), "must not be negative")
            })?;
        }
        if settings.has_setting(keys::INBOUND_BACKPRESSURE_POLICY) {
            let value = settings.setting(keys::INBOUND_BACKPRESSURE_POLICY)?;
            self.backpressure =
                value.parse().map_err(|reason: String| ConfigError::invalid(keys::INBOUND_BACKPRESSURE_POLICY, value, reason))?;
        }
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TransportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backpressure, BackpressurePolicy::Block);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("block".parse::<BackpressurePolicy>().unwrap(), BackpressurePolicy::Block);
        assert_eq!("Drop-Newest".parse::<BackpressurePolicy>().unwrap(), BackpressurePolicy::DropNewest);
        assert!("fatal".parse::<BackpressurePolicy>().is_err());
        assert_eq!(BackpressurePolicy::DropNewest.to_string(), "drop-newest");
    }

    #[test]
    fn test_session_settings_overlay() {
        let settings = SessionSettings::new()
            .with(keys::INBOUND_CHANNEL_CAPACITY, "16")
            .with(keys::INBOUND_BACKPRESSURE_POLICY, "drop-newest");

        let config = TransportConfig::default().with_session_settings(&settings).unwrap();
        assert_eq!(config.inbound_capacity, 16);
        assert_eq!(config.backpressure, BackpressurePolicy::DropNewest);
    }

    #[test]
    fn test_invalid_session_settings() {
        let zero = SessionSettings::new().with(keys::INBOUND_CHANNEL_CAPACITY, "0");
        assert!(TransportConfig::default().with_session_settings(&zero).is_err());

        let bad_policy = SessionSettings::new().with(keys::INBOUND_BACKPRESSURE_POLICY, "sometimes");
        assert!(matches!(
            TransportConfig::default().with_session_settings(&bad_policy),
            Err(ConfigError::InvalidSetting { .. })
        ));
    }
}

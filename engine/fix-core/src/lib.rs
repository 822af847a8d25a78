//! # FIX Core
//!
//! Identity and settings types shared by every crate of the engine.
//!
//! - **SessionID**: composite key for one logical counterparty connection
//! - **SessionSettings**: resolved key/value options for one session
//! - **Settings**: the global options plus every configured session

pub mod error;
pub mod session_id;
pub mod settings;

pub use error::{ConfigError, Result};
pub use session_id::SessionID;
pub use settings::{parse_duration, SessionSettings, Settings};

/// Setting names understood by the engine crates.
pub mod keys {
    pub const BEGIN_STRING: &str = "BeginString";
    pub const SENDER_COMP_ID: &str = "SenderCompID";
    pub const SENDER_SUB_ID: &str = "SenderSubID";
    pub const SENDER_LOCATION_ID: &str = "SenderLocationID";
    pub const TARGET_COMP_ID: &str = "TargetCompID";
    pub const TARGET_SUB_ID: &str = "TargetSubID";
    pub const TARGET_LOCATION_ID: &str = "TargetLocationID";
    pub const SESSION_QUALIFIER: &str = "SessionQualifier";

    pub const FILE_LOG_PATH: &str = "FileLogPath";
    pub const FILE_STORE_PATH: &str = "FileStorePath";

    pub const SQL_STORE_DRIVER: &str = "SQLStoreDriver";
    pub const SQL_STORE_DATA_SOURCE_NAME: &str = "SQLStoreDataSourceName";
    pub const SQL_STORE_CONN_MAX_LIFETIME: &str = "SQLStoreConnMaxLifetime";
    pub const SQL_STORE_TARGET_SEQNUM_DEBOUNCE: &str = "SQLStoreTargetSeqNumDebounce";

    pub const INBOUND_CHANNEL_CAPACITY: &str = "InboundChannelCapacity";
    pub const INBOUND_BACKPRESSURE_POLICY: &str = "InboundBackpressurePolicy";
}

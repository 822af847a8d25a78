//! # Audit Log
//!
//! Append-only audit trail of every FIX message a session exchanges, plus
//! a free-form event log. Messages pass through a [`RedactionPolicy`] first:
//! high-volume market data is dropped and credential fields are masked before
//! anything touches disk.
//!
//! - **Log / LogFactory**: contracts used by sessions and the transport
//! - **FileLog**: `<prefix>.event.current.log` and `<prefix>.messages.current.log`
//! - **TracingLog**: forwards records to `tracing` under the `fix::audit` target
//! - **NullLog**: discards everything
//! - **scanner**: delimiter-aware `tag=value` field scanner shared by type lookup and redaction

pub mod error;
pub mod file_log;
pub mod log;
pub mod null;
pub mod redaction;
pub mod scanner;
pub mod tracing_log;

pub use error::{LogError, Result};
pub use file_log::{FileLog, FileLogFactory, GLOBAL_PREFIX};
pub use log::{Log, LogFactory};
pub use null::{NullLog, NullLogFactory};
pub use redaction::{redact_tags, Direction, RedactionPolicy, REDACTION_MARKER};
pub use scanner::{msg_type, SOH};
pub use tracing_log::{TracingLog, TracingLogFactory, AUDIT_TARGET};

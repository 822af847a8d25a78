//! Audit log contracts

use crate::error::Result;
use fix_core::SessionID;
use std::fmt;
use std::sync::Arc;

/// Sink for raw messages and session events.
///
/// Writes are infallible from the caller's point of view: a sink that cannot
/// persist a record reports the failure on the diagnostic log and carries on.
pub trait Log: Send + Sync {
    /// Raw message received from the counterparty
    fn on_incoming(&self, raw: &[u8]);

    /// Raw message sent to the counterparty
    fn on_outgoing(&self, raw: &[u8]);

    /// Free-form session event
    fn on_event(&self, msg: &str);

    /// Formatted session event, see [`log_eventf!`](crate::log_eventf)
    fn on_eventf(&self, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(msg) => self.on_event(msg),
            None => self.on_event(&args.to_string()),
        }
    }
}

/// Creates the global log and one log per session
pub trait LogFactory: Send + Sync {
    /// Global (non-session) log
    fn create(&self) -> Result<Arc<dyn Log>>;

    /// Log for one configured session
    fn create_session_log(&self, session_id: &SessionID) -> Result<Arc<dyn Log>>;
}

/// Write a formatted event to a [`Log`]
///
/// ```rust
/// use audit_log::{log_eventf, Log, NullLog};
///
/// let log = NullLog;
/// log_eventf!(log, "Resending messages {} through {}", 10, 20);
/// ```
#[macro_export]
macro_rules! log_eventf {
    ($log:expr, $($arg:tt)+) => {{
        use $crate::Log as _;
        $log.on_eventf(format_args!($($arg)+))
    }};
}

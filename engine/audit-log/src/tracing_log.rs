//! Audit records forwarded to `tracing`
//!
//! Useful when the audit trail should end up wherever the process log goes
//! (stdout, JSON collector). The same filter and redaction policy as the file
//! log is applied, and SOH is always shown as `|`.

use crate::error::Result;
use crate::log::{Log, LogFactory};
use crate::redaction::{display_delimited, Direction, RedactionPolicy};
use crate::GLOBAL_PREFIX;
use fix_core::SessionID;
use std::sync::Arc;

/// Target used for every audit event
pub const AUDIT_TARGET: &str = "fix::audit";

#[derive(Debug, Clone)]
pub struct TracingLog {
    prefix: String,
    policy: Arc<RedactionPolicy>,
}

impl TracingLog {
    pub fn new(prefix: impl Into<String>, policy: Arc<RedactionPolicy>) -> Self {
        Self { prefix: prefix.into(), policy }
    }

    fn message(&self, raw: &[u8], direction: Direction) {
        let Some(record) = self.policy.apply(raw, direction) else {
            return;
        };
        let record = display_delimited(record, Some(b'|'));
        let text = String::from_utf8_lossy(&record);
        match direction {
            Direction::Incoming => {
                tracing::info!(target: AUDIT_TARGET, session = %self.prefix, direction = "incoming", "{text}")
            }
            Direction::Outgoing => {
                tracing::info!(target: AUDIT_TARGET, session = %self.prefix, direction = "outgoing", "{text}")
            }
        }
    }
}

impl Log for TracingLog {
    fn on_incoming(&self, raw: &[u8]) {
        self.message(raw, Direction::Incoming);
    }

    fn on_outgoing(&self, raw: &[u8]) {
        self.message(raw, Direction::Outgoing);
    }

    fn on_event(&self, msg: &str) {
        tracing::info!(target: AUDIT_TARGET, session = %self.prefix, "{msg}");
    }
}

#[derive(Debug, Clone, Default)]
pub struct TracingLogFactory {
    policy: Arc<RedactionPolicy>,
}

impl TracingLogFactory {
    pub fn new(policy: RedactionPolicy) -> Self {
        Self { policy: Arc::new(policy) }
    }
}

impl LogFactory for TracingLogFactory {
    fn create(&self) -> Result<Arc<dyn Log>> {
        Ok(Arc::new(TracingLog::new(GLOBAL_PREFIX, self.policy.clone())))
    }

    fn create_session_log(&self, session_id: &SessionID) -> Result<Arc<dyn Log>> {
        Ok(Arc::new(TracingLog::new(session_id.to_string(), self.policy.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_forwards_redacted_messages() {
        let log = TracingLogFactory::default().create_session_log(&SessionID::new("FIX.4.4", "A", "B")).unwrap();
        let out = captured(|| {
            log.on_outgoing(b"35=A\x01554=hunter2\x01");
            log.on_incoming(b"35=W\x0155=X\x01");
            log.on_event("Created session");
        });

        assert!(out.contains("fix::audit"));
        assert!(out.contains("35=A|554=******|"));
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("35=W"));
        assert!(out.contains("Created session"));
    }
}

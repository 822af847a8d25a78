use crate::error::Result;
use crate::log::{Log, LogFactory};
use fix_core::SessionID;
use std::sync::Arc;

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl Log for NullLog {
    fn on_incoming(&self, _raw: &[u8]) {}

    fn on_outgoing(&self, _raw: &[u8]) {}

    fn on_event(&self, _msg: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogFactory;

impl LogFactory for NullLogFactory {
    fn create(&self) -> Result<Arc<dyn Log>> {
        Ok(Arc::new(NullLog))
    }

    fn create_session_log(&self, _session_id: &SessionID) -> Result<Arc<dyn Log>> {
        Ok(Arc::new(NullLog))
    }
}

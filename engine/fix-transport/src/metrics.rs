// Metrics collection for the transport pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-connection counters, shared by both loops and the owner
#[derive(Debug, Default)]
pub struct TransportMetrics {
    pub messages_read: AtomicCounter,
    pub messages_written: AtomicCounter,
    pub write_errors: AtomicCounter,
    /// Times the inbound channel was found full
    pub backpressure_events: AtomicCounter,
    /// Messages discarded under `DropNewest`
    pub messages_dropped: AtomicCounter,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TransportMetricsSnapshot {
        TransportMetricsSnapshot {
            messages_read: self.messages_read.get(),
            messages_written: self.messages_written.get(),
            write_errors: self.write_errors.get(),
            backpressure_events: self.backpressure_events.get(),
            messages_dropped: self.messages_dropped.get(),
        }
    }
}

/// Point-in-time copy of [`TransportMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportMetricsSnapshot {
    pub messages_read: u64,
    pub messages_written: u64,
    pub write_errors: u64,
    pub backpressure_events: u64,
    pub messages_dropped: u64,
}

/// Thread-safe atomic counter
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

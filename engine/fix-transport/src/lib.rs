//! # FIX Transport
//!
//! Moves bytes between a socket and a session. Each connection runs two
//! independent tasks:
//!
//! - **read loop**: frames messages with a [`MessageParser`] and forwards them,
//!   with their arrival time, into a bounded inbound channel
//! - **write loop**: drains the outbound channel onto the socket
//!
//! A full inbound channel is a backpressure event: counted in
//! [`TransportMetrics`], logged, reported to the audit event log and then
//! handled per [`BackpressurePolicy`].

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod pipeline;

pub use config::{BackpressurePolicy, TransportConfig};
pub use connection::{Connection, ConnectionState, ConnectionSummary, SessionChannels};
pub use error::{Result, TransportError};
pub use metrics::{TransportMetrics, TransportMetricsSnapshot};
pub use parser::{extract_frame, FixParser, InboundMessage, MessageParser};
pub use pipeline::{read_loop, write_loop};

pub use bytes::Bytes;

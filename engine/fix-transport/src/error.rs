//! Error types for the transport pipeline

use thiserror::Error;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Reasons a loop direction stops
#[derive(Error, Debug)]
pub enum TransportError {
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes on the wire are not a FIX frame
    #[error("Parse error: {0}")]
    Parse(String),

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    Eof,

    /// The other end of a channel was dropped
    #[error("Channel closed")]
    ChannelClosed,
}

impl TransportError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// True for an orderly close by either side
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Eof | Self::ChannelClosed)
    }
}

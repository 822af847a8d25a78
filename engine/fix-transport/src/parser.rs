//! FIX framing
//!
//! A frame is `8=<BeginString><SOH>9=<BodyLength><SOH>` followed by exactly
//! BodyLength bytes and the `10=<CheckSum><SOH>` trailer. Bytes before the
//! first `8=` are discarded. The checksum value itself is not verified here.

use crate::error::{Result, TransportError};
use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

const SOH: u8 = 0x01;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Longest `9=` or `10=` value we wait for before calling the stream garbage
const MAX_NUMERIC_FIELD: usize = 16;

/// A complete raw message and the time the read that completed it returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub bytes: Bytes,
    pub received_at: DateTime<Utc>,
}

/// Source of framed messages for the read loop
#[async_trait::async_trait]
pub trait MessageParser: Send {
    /// Next complete message. Any error ends the read side of the connection.
    async fn read_message(&mut self) -> Result<InboundMessage>;
}

/// Frames FIX messages from a byte stream
#[derive(Debug)]
pub struct FixParser<R> {
    reader: R,
    buffer: BytesMut,
    last_read: DateTime<Utc>,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin + Send> FixParser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_message_size(reader, DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(reader: R, max_message_size: usize) -> Self {
        Self { reader, buffer: BytesMut::with_capacity(16 * 1024), last_read: Utc::now(), max_message_size }
    }

    /// Time the last socket read returned
    pub fn last_read(&self) -> DateTime<Utc> {
        self.last_read
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.reader.read_buf(&mut self.buffer).await?;
        if n == 0 {
            if !self.buffer.is_empty() {
                tracing::debug!(pending = self.buffer.len(), "Peer closed mid-frame");
            }
            return Err(TransportError::Eof);
        }
        self.last_read = Utc::now();
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> MessageParser for FixParser<R> {
    async fn read_message(&mut self) -> Result<InboundMessage> {
        loop {
            if let Some(bytes) = extract_frame(&mut self.buffer, self.max_message_size)? {
                return Ok(InboundMessage { bytes, received_at: self.last_read });
            }
            self.fill().await?;
        }
    }
}

fn find(buf: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    buf.get(from..)?.windows(needle.len()).position(|w| w == needle).map(|i| from + i)
}

fn find_soh(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?.iter().position(|&b| b == SOH).map(|i| from + i)
}

/// Split one complete frame off the front of `buf`, if there is one
pub fn extract_frame(buf: &mut BytesMut, max_message_size: usize) -> Result<Option<Bytes>> {
    let Some(start) = find(buf, 0, b"8=") else {
        // A trailing '8' may be the start of the next frame
        let keep = usize::from(buf.last() == Some(&b'8'));
        let skipped = buf.len() - keep;
        if skipped > 0 {
            tracing::debug!(skipped, "Discarding bytes without BeginString");
            buf.advance(skipped);
        }
        return Ok(None);
    };
    if start > 0 {
        tracing::debug!(skipped = start, "Discarding bytes before BeginString");
        buf.advance(start);
    }

    let Some(begin_end) = find_soh(buf, 2) else {
        return ensure_bounded(buf.len(), max_message_size);
    };

    let length_start = begin_end + 1;
    if buf.len() < length_start + 2 {
        return Ok(None);
    }
    if &buf[length_start..length_start + 2] != b"9=" {
        return Err(TransportError::parse("BodyLength (9) must follow BeginString (8)"));
    }

    let Some(length_end) = find_soh(buf, length_start + 2) else {
        if buf.len() - length_start > MAX_NUMERIC_FIELD {
            return Err(TransportError::parse("unterminated BodyLength"));
        }
        return Ok(None);
    };
    let digits = &buf[length_start + 2..length_end];
    let body_length: usize = std::str::from_utf8(digits)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TransportError::parse(format!("invalid BodyLength {:?}", String::from_utf8_lossy(digits))))?;

    let trailer_start = (length_end + 1)
        .checked_add(body_length)
        .filter(|&end| end <= max_message_size)
        .ok_or_else(|| {
            TransportError::parse(format!("BodyLength {body_length} exceeds maximum message size {max_message_size}"))
        })?;
    if buf.len() < trailer_start + 3 {
        return Ok(None);
    }
    if &buf[trailer_start..trailer_start + 3] != b"10=" {
        return Err(TransportError::parse("CheckSum (10) not found at BodyLength offset"));
    }

    let Some(end) = find_soh(buf, trailer_start + 3) else {
        if buf.len() - trailer_start > MAX_NUMERIC_FIELD {
            return Err(TransportError::parse("unterminated CheckSum"));
        }
        return Ok(None);
    };

    Ok(Some(buf.split_to(end + 1).freeze()))
}

fn ensure_bounded(len: usize, max_message_size: usize) -> Result<Option<Bytes>> {
    if len > max_message_size {
        return Err(TransportError::parse("BeginString not terminated"));
    }
    Ok(None)
}

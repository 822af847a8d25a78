//! A live connection: one read task, one write task

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::metrics::{TransportMetrics, TransportMetricsSnapshot};
use crate::parser::{FixParser, InboundMessage, MessageParser};
use crate::pipeline::{read_loop, write_loop};
use audit_log::Log;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Both loops active
    Running,
    /// Read side ended and the inbound channel is closed; the writer may still drain
    ReadClosed,
    /// The writer saw the outbound channel close and returned
    Terminated,
}

/// Channels handed to the session that owns a connection
#[derive(Debug)]
pub struct SessionChannels {
    /// Parsed inbound messages; `None` from `recv` means the read side is gone
    pub inbound: mpsc::Receiver<InboundMessage>,
    /// Raw outbound buffers; dropping every sender stops the writer
    pub outbound: mpsc::Sender<Bytes>,
}

/// Handles to the two tasks serving one socket
#[derive(Debug)]
pub struct Connection {
    reader: JoinHandle<TransportError>,
    writer: JoinHandle<()>,
    metrics: Arc<TransportMetrics>,
}

impl Connection {
    /// Split `stream`, frame it with [`FixParser`] and start both loops
    pub fn spawn<S>(stream: S, config: &TransportConfig, log: Arc<dyn Log>) -> (Self, SessionChannels)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let parser = FixParser::with_max_message_size(read_half, config.max_message_size);
        Self::spawn_with_parser(parser, write_half, config, log)
    }

    /// Start both loops over an arbitrary parser and writer
    pub fn spawn_with_parser<P, W>(
        parser: P,
        writer: W,
        config: &TransportConfig,
        log: Arc<dyn Log>,
    ) -> (Self, SessionChannels)
    where
        P: MessageParser + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let metrics = Arc::new(TransportMetrics::new());

        let reader = tokio::spawn({
            let metrics = metrics.clone();
            let log = log.clone();
            let policy = config.backpressure;
            async move {
                let reason = read_loop(parser, inbound_tx, policy, metrics, log.clone()).await;
                if reason.is_closed() {
                    tracing::info!(reason = %reason, "Read side closed");
                } else {
                    tracing::warn!(reason = %reason, "Read side failed");
                }
                log.on_event(&format!("Read side closed: {reason}"));
                reason
            }
        });

        let writer = tokio::spawn({
            let metrics = metrics.clone();
            async move {
                write_loop(writer, outbound_rx, metrics, log).await;
            }
        });

        tracing::debug!(
            inbound_capacity = config.inbound_capacity,
            outbound_capacity = config.outbound_capacity,
            backpressure = %config.backpressure,
            "Connection started"
        );

        (Self { reader, writer, metrics }, SessionChannels { inbound: inbound_rx, outbound: outbound_tx })
    }

    pub fn state(&self) -> ConnectionState {
        if self.writer.is_finished() {
            ConnectionState::Terminated
        } else if self.reader.is_finished() {
            ConnectionState::ReadClosed
        } else {
            ConnectionState::Running
        }
    }

    pub fn metrics(&self) -> TransportMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shared counters, for exporting while the connection runs
    pub fn metrics_handle(&self) -> Arc<TransportMetrics> {
        self.metrics.clone()
    }

    /// Stop the read side without waiting for the peer
    pub fn abort_reader(&self) {
        self.reader.abort();
    }

    /// Wait for both tasks. The writer only finishes once every outbound
    /// sender is dropped.
    pub async fn join(self) -> ConnectionSummary {
        let read_error = match self.reader.await {
            Ok(reason) => Some(reason),
            Err(e) if e.is_cancelled() => None,
            Err(e) => Some(TransportError::Io(std::io::Error::other(e.to_string()))),
        };
        if let Err(e) = self.writer.await {
            tracing::error!(error = %e, "Writer task failed");
        }
        ConnectionSummary { read_error, metrics: self.metrics.snapshot() }
    }
}

/// How a connection ended
#[derive(Debug)]
pub struct ConnectionSummary {
    /// Why the read side stopped; `None` if it was aborted
    pub read_error: Option<TransportError>,
    pub metrics: TransportMetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_log::NullLog;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn frame(seq: u64) -> Vec<u8> {
        let body = format!("35=0\x0134={seq}\x01");
        format!("8=FIX.4.4\x019={}\x01{body}10=000\x01", body.len()).into_bytes()
    }

    async fn wait_for(connection: &Connection, state: ConnectionState) {
        for _ in 0..100 {
            if connection.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never reached {state:?}, still {:?}", connection.state());
    }

    #[tokio::test]
    async fn test_lifecycle_running_read_closed_terminated() {
        let (mut peer, local) = tokio::io::duplex(4096);
        let (connection, mut channels) = Connection::spawn(local, &TransportConfig::default(), Arc::new(NullLog));
        assert_eq!(connection.state(), ConnectionState::Running);

        peer.write_all(&frame(1)).await.unwrap();
        assert!(channels.inbound.recv().await.unwrap().bytes.ends_with(b"34=1\x0110=000\x01"));

        channels.outbound.send(Bytes::from(frame(7))).await.unwrap();
        let mut echoed = vec![0u8; frame(7).len()];
        peer.read_exact(&mut echoed).await.unwrap();
        assert_eq!(echoed, frame(7));

        // Peer hangs up: read side closes, writer keeps going
        peer.shutdown().await.unwrap();
        assert!(channels.inbound.recv().await.is_none());
        wait_for(&connection, ConnectionState::ReadClosed).await;

        channels.outbound.send(Bytes::from_static(b"late")).await.unwrap();
        let mut late = [0u8; 4];
        peer.read_exact(&mut late).await.unwrap();
        assert_eq!(&late, b"late");

        drop(channels.outbound);
        wait_for(&connection, ConnectionState::Terminated).await;

        let summary = connection.join().await;
        assert!(matches!(summary.read_error, Some(TransportError::Eof)));
        assert_eq!(summary.metrics.messages_read, 1);
        assert_eq!(summary.metrics.messages_written, 2);
    }

    #[tokio::test]
    async fn test_mock_stream_three_messages_then_reset() {
        let stream = tokio_test::io::Builder::new()
            .read(&frame(1))
            .read(&frame(2))
            .read(&frame(3))
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"))
            .build();

        let (connection, mut channels) = Connection::spawn_with_parser(
            FixParser::new(stream),
            tokio::io::sink(),
            &TransportConfig::default(),
            Arc::new(NullLog),
        );

        for seq in 1..=3 {
            let msg = channels.inbound.recv().await.unwrap();
            assert!(msg.bytes.ends_with(format!("34={seq}\x0110=000\x01").as_bytes()));
        }
        assert!(channels.inbound.recv().await.is_none());

        drop(channels.outbound);
        let summary = connection.join().await;
        assert!(matches!(summary.read_error, Some(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_abort_reader_forces_read_closed() {
        let (_peer, local) = tokio::io::duplex(64);
        let (connection, mut channels) = Connection::spawn(local, &TransportConfig::default(), Arc::new(NullLog));

        connection.abort_reader();
        assert!(channels.inbound.recv().await.is_none());
        wait_for(&connection, ConnectionState::ReadClosed).await;

        drop(channels.outbound);
        let summary = connection.join().await;
        assert!(summary.read_error.is_none());
    }
}

//! The two loops of a live connection
//!
//! [`read_loop`] moves framed messages from the parser into the bounded
//! inbound channel; [`write_loop`] drains the outbound channel onto the
//! socket. They share nothing but the metrics and the audit log, and each
//! stops independently.

use crate::config::BackpressurePolicy;
use crate::error::TransportError;
use crate::metrics::TransportMetrics;
use crate::parser::{InboundMessage, MessageParser};
use audit_log::{log_eventf, Log};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Forward parsed messages to `inbound` until the parser fails.
///
/// Returns the error that ended the loop. `inbound` is dropped on return,
/// which closes the channel: that is how the session learns the read side
/// is gone.
pub async fn read_loop<P: MessageParser>(
    mut parser: P,
    inbound: mpsc::Sender<InboundMessage>,
    policy: BackpressurePolicy,
    metrics: Arc<TransportMetrics>,
    log: Arc<dyn Log>,
) -> TransportError {
    loop {
        let msg = match parser.read_message().await {
            Ok(msg) => msg,
            Err(e) => return e,
        };
        metrics.messages_read.inc();

        let msg = match inbound.try_send(msg) {
            Ok(()) => continue,
            Err(TrySendError::Closed(_)) => return TransportError::ChannelClosed,
            Err(TrySendError::Full(msg)) => msg,
        };

        metrics.backpressure_events.inc();
        tracing::warn!(
            capacity = inbound.max_capacity(),
            policy = %policy,
            backpressure_events = metrics.backpressure_events.get(),
            "Inbound channel full"
        );
        log_eventf!(log, "Inbound channel full (capacity {}), applying {} policy", inbound.max_capacity(), policy);

        match policy {
            BackpressurePolicy::Block => {
                if inbound.send(msg).await.is_err() {
                    return TransportError::ChannelClosed;
                }
            }
            BackpressurePolicy::DropNewest => {
                metrics.messages_dropped.inc();
                tracing::warn!(dropped = metrics.messages_dropped.get(), "Dropped inbound message");
            }
        }
    }
}

/// Write every buffer received on `outbound` to `writer`, in order.
///
/// A failed write is reported to the audit event log and the loop moves on
/// to the next buffer; only closing the outbound channel stops it.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    metrics: Arc<TransportMetrics>,
    log: Arc<dyn Log>,
) {
    while let Some(msg) = outbound.recv().await {
        let result = async {
            writer.write_all(&msg).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => metrics.messages_written.inc(),
            Err(e) => {
                metrics.write_errors.inc();
                tracing::warn!(error = %e, len = msg.len(), "Socket write failed");
                log.on_event(&e.to_string());
            }
        }
    }
    tracing::debug!("Outbound channel closed, writer done");
}

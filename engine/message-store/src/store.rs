//! The message store contract
//!
//! A store owns the state of exactly one session: the creation time, the next
//! sender and target sequence numbers, and the log of sent messages kept for
//! resend requests. The session state machine only ever talks to this trait.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use fix_core::SessionID;

/// Persistent per-session state used by the session layer
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Sequence number the next outbound message will carry
    fn next_sender_msg_seq_num(&self) -> u64;

    /// Sequence number expected on the next inbound message
    fn next_target_msg_seq_num(&self) -> u64;

    /// Set the next outbound sequence number. The cached value only changes
    /// once the durable write (if any) succeeded.
    async fn set_next_sender_msg_seq_num(&mut self, next: u64) -> Result<()>;

    /// Set the next inbound sequence number
    async fn set_next_target_msg_seq_num(&mut self, next: u64) -> Result<()>;

    async fn incr_next_sender_msg_seq_num(&mut self) -> Result<()> {
        let current = self.next_sender_msg_seq_num();
        let next = current.checked_add(1).ok_or(StoreError::InvalidSeqNum(current))?;
        self.set_next_sender_msg_seq_num(next).await
    }

    async fn incr_next_target_msg_seq_num(&mut self) -> Result<()> {
        let current = self.next_target_msg_seq_num();
        let next = current.checked_add(1).ok_or(StoreError::InvalidSeqNum(current))?;
        self.set_next_target_msg_seq_num(next).await
    }

    /// Time the session state was first persisted or last reset
    fn creation_time(&self) -> DateTime<Utc>;

    /// Set both sequence numbers to 1, clear the message log and refresh the
    /// creation time
    async fn reset(&mut self) -> Result<()>;

    /// Discard cached state and reload it from the durable backend
    async fn refresh(&mut self) -> Result<()>;

    /// Append a sent message. Saving the same sequence number twice keeps both.
    async fn save_message(&mut self, seq_num: u64, msg: &[u8]) -> Result<()>;

    /// Messages with `begin <= seq_num <= end`, ascending by sequence number.
    /// No match is an empty vector, not an error.
    async fn get_messages(&self, begin: u64, end: u64) -> Result<Vec<Vec<u8>>>;

    /// Release backend resources. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Creates one store per session
#[async_trait::async_trait]
pub trait MessageStoreFactory: Send + Sync {
    async fn create(&self, session_id: &SessionID) -> Result<Box<dyn MessageStore>>;
}

/// Reject sequence numbers below 1
pub(crate) fn validate_seq_num(next: u64) -> Result<u64> {
    if next == 0 {
        return Err(StoreError::InvalidSeqNum(next));
    }
    Ok(next)
}

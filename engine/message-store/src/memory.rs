//! In-process store with no durability
//!
//! Every durable backend keeps one of these as its cache of counters and
//! creation time.

use crate::error::Result;
use crate::store::{validate_seq_num, MessageStore, MessageStoreFactory};
use chrono::{DateTime, Utc};
use fix_core::SessionID;
use std::collections::BTreeMap;

/// Session state held in memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    creation_time: DateTime<Utc>,
    next_sender_msg_seq_num: u64,
    next_target_msg_seq_num: u64,
    messages: BTreeMap<u64, Vec<Vec<u8>>>,
}

impl MemoryStore {
    /// Fresh state: both sequence numbers at 1, creation time now
    pub fn new() -> Self {
        Self::with_creation_time(Utc::now())
    }

    pub fn with_creation_time(creation_time: DateTime<Utc>) -> Self {
        Self {
            creation_time,
            next_sender_msg_seq_num: 1,
            next_target_msg_seq_num: 1,
            messages: BTreeMap::new(),
        }
    }

    /// Load state recovered from a durable backend
    pub(crate) fn restore(creation_time: DateTime<Utc>, next_sender: u64, next_target: u64) -> Self {
        Self {
            creation_time,
            next_sender_msg_seq_num: next_sender,
            next_target_msg_seq_num: next_target,
            messages: BTreeMap::new(),
        }
    }

    pub(crate) fn store_next_sender(&mut self, next: u64) {
        self.next_sender_msg_seq_num = next;
    }

    pub(crate) fn store_next_target(&mut self, next: u64) {
        self.next_target_msg_seq_num = next;
    }

    /// Reset counters and history to the given creation time
    pub(crate) fn reset_to(&mut self, creation_time: DateTime<Utc>) {
        *self = Self::with_creation_time(creation_time);
    }

    /// Number of stored message bodies
    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    fn next_sender_msg_seq_num(&self) -> u64 {
        self.next_sender_msg_seq_num
    }

    fn next_target_msg_seq_num(&self) -> u64 {
        self.next_target_msg_seq_num
    }

    async fn set_next_sender_msg_seq_num(&mut self, next: u64) -> Result<()> {
        self.next_sender_msg_seq_num = validate_seq_num(next)?;
        Ok(())
    }

    async fn set_next_target_msg_seq_num(&mut self, next: u64) -> Result<()> {
        self.next_target_msg_seq_num = validate_seq_num(next)?;
        Ok(())
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    async fn reset(&mut self) -> Result<()> {
        self.reset_to(Utc::now());
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        // Nothing durable to reload from
        Ok(())
    }

    async fn save_message(&mut self, seq_num: u64, msg: &[u8]) -> Result<()> {
        self.messages.entry(seq_num).or_default().push(msg.to_vec());
        Ok(())
    }

    async fn get_messages(&self, begin: u64, end: u64) -> Result<Vec<Vec<u8>>> {
        if begin > end {
            return Ok(Vec::new());
        }
        Ok(self.messages.range(begin..=end).flat_map(|(_, bodies)| bodies.iter().cloned()).collect())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Factory producing independent in-memory stores
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreFactory;

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl MessageStoreFactory for MemoryStoreFactory {
    async fn create(&self, session_id: &SessionID) -> Result<Box<dyn MessageStore>> {
        tracing::debug!(session = %session_id, "Creating in-memory message store");
        Ok(Box::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_fresh_store_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sender_msg_seq_num(), 1);
        assert_eq!(store.next_target_msg_seq_num(), 1);
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_seq_num_rejected() {
        let mut store = MemoryStore::new();
        store.set_next_sender_msg_seq_num(7).await.unwrap();

        let err = store.set_next_sender_msg_seq_num(0).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSeqNum(0)));
        assert_eq!(store.next_sender_msg_seq_num(), 7);
    }

    #[tokio::test]
    async fn test_increment_at_max_is_an_error() {
        let mut store = MemoryStore::new();
        store.set_next_sender_msg_seq_num(u64::MAX).await.unwrap();
        store.set_next_target_msg_seq_num(u64::MAX).await.unwrap();

        assert!(matches!(store.incr_next_sender_msg_seq_num().await, Err(StoreError::InvalidSeqNum(u64::MAX))));
        assert!(matches!(store.incr_next_target_msg_seq_num().await, Err(StoreError::InvalidSeqNum(u64::MAX))));
        assert_eq!(store.next_sender_msg_seq_num(), u64::MAX);
        assert_eq!(store.next_target_msg_seq_num(), u64::MAX);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let mut store = MemoryStore::new();
        let created = store.creation_time();
        store.set_next_sender_msg_seq_num(10).await.unwrap();
        store.set_next_target_msg_seq_num(20).await.unwrap();
        store.save_message(9, b"body").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        store.reset().await.unwrap();

        assert_eq!(store.next_sender_msg_seq_num(), 1);
        assert_eq!(store.next_target_msg_seq_num(), 1);
        assert!(store.get_messages(1, u64::MAX).await.unwrap().is_empty());
        assert!(store.creation_time() > created);
    }

    #[tokio::test]
    async fn test_get_messages_orders_by_seq_num() {
        let mut store = MemoryStore::new();
        store.save_message(3, b"three").await.unwrap();
        store.save_message(1, b"one").await.unwrap();
        store.save_message(2, b"two").await.unwrap();

        let msgs = store.get_messages(1, 3).await.unwrap();
        assert_eq!(msgs, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(store.get_messages(2, 2).await.unwrap(), vec![b"two".to_vec()]);
        assert!(store.get_messages(4, 10).await.unwrap().is_empty());
        assert!(store.get_messages(3, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_seq_num_is_kept() {
        let mut store = MemoryStore::new();
        store.save_message(5, b"first").await.unwrap();
        store.save_message(5, b"second").await.unwrap();
        assert_eq!(store.get_messages(5, 5).await.unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn prop_increments_add_up(start in 1u64..1_000_000, n in 0usize..200) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let mut store = MemoryStore::new();
                store.set_next_sender_msg_seq_num(start).await.unwrap();
                for _ in 0..n {
                    store.incr_next_sender_msg_seq_num().await.unwrap();
                }
                assert_eq!(store.next_sender_msg_seq_num(), start + n as u64);
            });
        }
    }
}

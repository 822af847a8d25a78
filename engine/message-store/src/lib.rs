//! # Message Store
//!
//! This crate persists the per-session state of the FIX engine: the next
//! outbound and inbound sequence numbers, the session creation time and the
//! bodies of sent messages kept for resend.
//!
//! ## Architecture
//!
//! - **MessageStore**: Async trait every backend implements
//! - **MemoryStore**: Volatile store, also the cache in front of the durable ones
//! - **FileStore**: Memory-mapped counters plus append-only body files
//! - **SqlStore**: Postgres or SQLite mirror with debounced inbound writes
//! - **SequenceFile**: Fixed-width memory-mapped counter
//!
//! ## Usage
//!
//! ```rust
//! use fix_core::SessionID;
//! use message_store::{MemoryStore, MessageStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = MemoryStore::new();
//!
//!     store.save_message(1, b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01").await?;
//!     store.incr_next_sender_msg_seq_num().await?;
//!
//!     assert_eq!(store.next_sender_msg_seq_num(), 2);
//!     assert_eq!(store.get_messages(1, 1).await?.len(), 1);
//!     let _ = SessionID::new("FIX.4.4", "SENDER", "TARGET");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialect;
pub mod error;
pub mod file;
pub mod memory;
pub mod schema;
pub mod seqnum_file;
pub mod sql;
pub mod store;

pub use config::{FileStoreConfig, SqlStoreConfig, DEFAULT_TARGET_SEQNUM_DEBOUNCE};
pub use dialect::Dialect;
pub use error::{Result, StoreError};
pub use file::{FileStore, FileStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};
pub use schema::create_schema;
pub use seqnum_file::SequenceFile;
pub use sql::{open_pool, SqlStore, SqlStoreFactory, SqlStoreStats};
pub use store::{MessageStore, MessageStoreFactory};

pub use chrono::{DateTime, Utc};
pub use sqlx::AnyPool;

//! SQL-backed store
//!
//! A [`MemoryStore`] cache is the source of truth for reads; the `sessions`
//! row is a write-through mirror that is only read at construction and on
//! [`MessageStore::refresh`]. Sent messages are persisted to the `messages`
//! table and served from there.
//!
//! Inbound (target) sequence numbers advance once per received message, so
//! their durable writes are debounced: the row is only updated when the last
//! durable target write is at least `target_seqnum_debounce` old. The cache is
//! updated on every call. Outbound (sender) sequence numbers are never
//! debounced since a peer cannot tell us what we sent.

use crate::config::SqlStoreConfig;
use crate::dialect::{Dialect, Queries};
use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;
use crate::store::{validate_seq_num, MessageStore, MessageStoreFactory};
use chrono::{DateTime, Utc};
use fix_core::{SessionID, Settings};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Row};
use std::time::Duration;
use tokio::time::Instant;

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind the eight session key columns in `WHERE` clause order
fn bind_session<'q>(query: AnyQuery<'q>, s: &SessionID) -> AnyQuery<'q> {
    query
        .bind(s.begin_string.clone())
        .bind(s.qualifier.clone())
        .bind(s.sender_comp_id.clone())
        .bind(s.sender_sub_id.clone())
        .bind(s.sender_location_id.clone())
        .bind(s.target_comp_id.clone())
        .bind(s.target_sub_id.clone())
        .bind(s.target_location_id.clone())
}

fn to_db_seq_num(seq_num: u64) -> Result<i64> {
    i64::try_from(seq_num).map_err(|_| StoreError::InvalidSeqNum(seq_num))
}

fn from_db_seq_num(column: &str, value: i64) -> Result<u64> {
    match u64::try_from(value) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(StoreError::format(format!("{column} holds invalid sequence number {value}"))),
    }
}

/// Open a pool for `config`, usable by [`SqlStore::connect`] or shared
/// between sessions through [`SqlStore::with_pool`]
pub async fn open_pool(config: &SqlStoreConfig) -> Result<AnyPool> {
    config.dialect()?;
    sqlx::any::install_default_drivers();

    AnyPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .max_lifetime(config.conn_max_lifetime)
        .connect(&config.data_source_name)
        .await
        .map_err(StoreError::Connectivity)
}

/// Durable write counters of one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlStoreStats {
    pub sender_writes: u64,
    pub target_writes: u64,
    pub target_writes_debounced: u64,
}

/// Message store mirrored into a relational database
pub struct SqlStore {
    session_id: SessionID,
    cache: MemoryStore,
    dialect: Dialect,
    queries: Queries,
    pool: AnyPool,
    owns_pool: bool,
    closed: bool,
    target_seqnum_debounce: Duration,
    last_target_write: Instant,
    target_pending: bool,
    stats: SqlStoreStats,
}

impl SqlStore {
    /// Open a dedicated pool from `config`, verify it and load the session row
    pub async fn connect(session_id: SessionID, config: &SqlStoreConfig) -> Result<Self> {
        let dialect = config.dialect()?;
        let pool = open_pool(config).await?;
        Self::open(session_id, pool, dialect, config.target_seqnum_debounce, true).await
    }

    /// Use a pool shared with other sessions. The pool stays open when this
    /// store is closed.
    pub async fn with_pool(
        session_id: SessionID,
        pool: AnyPool,
        dialect: Dialect,
        target_seqnum_debounce: Duration,
    ) -> Result<Self> {
        Self::open(session_id, pool, dialect, target_seqnum_debounce, false).await
    }

    async fn open(
        session_id: SessionID,
        pool: AnyPool,
        dialect: Dialect,
        target_seqnum_debounce: Duration,
        owns_pool: bool,
    ) -> Result<Self> {
        // Fail now rather than on the first sequence number write
        sqlx::query("SELECT 1").execute(&pool).await.map_err(StoreError::Connectivity)?;

        let mut store = Self {
            session_id,
            cache: MemoryStore::new(),
            dialect,
            queries: Queries::new(dialect),
            pool,
            owns_pool,
            closed: false,
            target_seqnum_debounce,
            last_target_write: Instant::now(),
            target_pending: false,
            stats: SqlStoreStats::default(),
        };
        store.cache = store.populate_cache().await?;

        tracing::info!(
            session = %store.session_id,
            dialect = ?store.dialect,
            next_sender = store.cache.next_sender_msg_seq_num(),
            next_target = store.cache.next_target_msg_seq_num(),
            "SQL store opened"
        );
        Ok(store)
    }

    pub fn session_id(&self) -> &SessionID {
        &self.session_id
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn stats(&self) -> SqlStoreStats {
        self.stats
    }

    /// True when a debounced target sequence number has not reached the database yet
    pub fn has_pending_target_write(&self) -> bool {
        self.target_pending
    }

    fn pool(&self) -> Result<&AnyPool> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(&self.pool)
    }

    /// Load the session row, inserting a fresh one (now, 1, 1) if it is missing
    async fn populate_cache(&self) -> Result<MemoryStore> {
        let pool = self.pool()?;
        let row: Option<AnyRow> =
            bind_session(sqlx::query(&self.queries.select_session), &self.session_id).fetch_optional(pool).await?;

        if let Some(row) = row {
            let creation_time: String = row.try_get("creation_time")?;
            let creation_time = DateTime::parse_from_rfc3339(&creation_time)
                .map_err(|e| StoreError::format(format!("bad creation_time {creation_time:?}: {e}")))?
                .with_timezone(&Utc);
            let incoming = from_db_seq_num("incoming_seqnum", row.try_get("incoming_seqnum")?)?;
            let outgoing = from_db_seq_num("outgoing_seqnum", row.try_get("outgoing_seqnum")?)?;
            return Ok(MemoryStore::restore(creation_time, outgoing, incoming));
        }

        let fresh = MemoryStore::new();
        let query = sqlx::query(&self.queries.insert_session)
            .bind(fresh.creation_time().to_rfc3339())
            .bind(to_db_seq_num(fresh.next_target_msg_seq_num())?)
            .bind(to_db_seq_num(fresh.next_sender_msg_seq_num())?);
        bind_session(query, &self.session_id).execute(pool).await?;

        tracing::info!(session = %self.session_id, "Created session row");
        Ok(fresh)
    }

    async fn write_incoming(&mut self, next: u64) -> Result<()> {
        let query = sqlx::query(&self.queries.update_incoming).bind(to_db_seq_num(next)?);
        let result = bind_session(query, &self.session_id).execute(self.pool()?).await?;
        if result.rows_affected() == 0 {
            tracing::warn!(session = %self.session_id, "No session row updated for incoming_seqnum");
        }
        self.last_target_write = Instant::now();
        self.target_pending = false;
        self.stats.target_writes += 1;
        Ok(())
    }

    /// Write a debounced target sequence number now
    pub async fn flush_pending(&mut self) -> Result<()> {
        if self.target_pending {
            let next = self.cache.next_target_msg_seq_num();
            self.write_incoming(next).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageStore for SqlStore {
    fn next_sender_msg_seq_num(&self) -> u64 {
        self.cache.next_sender_msg_seq_num()
    }

    fn next_target_msg_seq_num(&self) -> u64 {
        self.cache.next_target_msg_seq_num()
    }

    async fn set_next_sender_msg_seq_num(&mut self, next: u64) -> Result<()> {
        let next = validate_seq_num(next)?;
        let query = sqlx::query(&self.queries.update_outgoing).bind(to_db_seq_num(next)?);
        let result = bind_session(query, &self.session_id).execute(self.pool()?).await?;
        if result.rows_affected() == 0 {
            tracing::warn!(session = %self.session_id, "No session row updated for outgoing_seqnum");
        }
        self.stats.sender_writes += 1;
        self.cache.store_next_sender(next);
        Ok(())
    }

    async fn set_next_target_msg_seq_num(&mut self, next: u64) -> Result<()> {
        let next = validate_seq_num(next)?;
        self.pool()?;

        if self.last_target_write.elapsed() >= self.target_seqnum_debounce {
            self.write_incoming(next).await?;
        } else {
            self.target_pending = true;
            self.stats.target_writes_debounced += 1;
        }
        self.cache.store_next_target(next);
        Ok(())
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.cache.creation_time()
    }

    async fn reset(&mut self) -> Result<()> {
        let creation_time = Utc::now();
        let mut tx = self.pool()?.begin().await?;

        let query =
            sqlx::query(&self.queries.reset_session).bind(creation_time.to_rfc3339()).bind(1i64).bind(1i64);
        bind_session(query, &self.session_id).execute(&mut *tx).await?;
        bind_session(sqlx::query(&self.queries.delete_messages), &self.session_id).execute(&mut *tx).await?;
        tx.commit().await?;

        // Cache only follows once the database agrees
        self.cache.reset_to(creation_time);
        self.last_target_write = Instant::now();
        self.target_pending = false;
        tracing::info!(session = %self.session_id, "SQL store reset");
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        let cache = self.populate_cache().await?;
        self.cache = cache;
        self.last_target_write = Instant::now();
        self.target_pending = false;
        tracing::debug!(session = %self.session_id, "SQL store refreshed");
        Ok(())
    }

    async fn save_message(&mut self, seq_num: u64, msg: &[u8]) -> Result<()> {
        let body = std::str::from_utf8(msg)
            .map_err(|e| StoreError::InvalidMessage(format!("message {seq_num} is not valid UTF-8: {e}")))?;
        let query = sqlx::query(&self.queries.insert_message).bind(to_db_seq_num(seq_num)?).bind(body.to_string());
        bind_session(query, &self.session_id).execute(self.pool()?).await?;
        Ok(())
    }

    async fn get_messages(&self, begin: u64, end: u64) -> Result<Vec<Vec<u8>>> {
        let pool = self.pool()?;
        let Ok(begin) = i64::try_from(begin) else {
            return Ok(Vec::new());
        };
        let end = i64::try_from(end).unwrap_or(i64::MAX);
        if begin > end {
            return Ok(Vec::new());
        }

        let rows = bind_session(sqlx::query(&self.queries.select_messages), &self.session_id)
            .bind(begin)
            .bind(end)
            .fetch_all(pool)
            .await?;

        rows.iter().map(|row| Ok(row.try_get::<String, _>("message")?.into_bytes())).collect()
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.flush_pending().await;
        self.closed = true;
        if self.owns_pool {
            self.pool.close().await;
        }
        flushed
    }
}

/// Creates SQL stores, either from per-session settings or on one shared pool
pub struct SqlStoreFactory {
    settings: Settings,
    shared: Option<(AnyPool, Dialect)>,
    target_seqnum_debounce: Duration,
}

impl SqlStoreFactory {
    /// Every session opens its own pool from `SQLStoreDriver` / `SQLStoreDataSourceName`
    pub fn new(settings: Settings, target_seqnum_debounce: Duration) -> Self {
        Self { settings, shared: None, target_seqnum_debounce }
    }

    /// Every session uses `pool`; connection settings are ignored
    pub fn with_shared_pool(
        settings: Settings,
        pool: AnyPool,
        dialect: Dialect,
        target_seqnum_debounce: Duration,
    ) -> Self {
        Self { settings, shared: Some((pool, dialect)), target_seqnum_debounce }
    }
}

#[async_trait::async_trait]
impl MessageStoreFactory for SqlStoreFactory {
    async fn create(&self, session_id: &SessionID) -> Result<Box<dyn MessageStore>> {
        let session_settings = self.settings.session(session_id)?;

        let store = match &self.shared {
            Some((pool, dialect)) => {
                SqlStore::with_pool(session_id.clone(), pool.clone(), *dialect, self.target_seqnum_debounce).await?
            }
            None => {
                let config = SqlStoreConfig::from_settings(session_settings, self.target_seqnum_debounce)?;
                SqlStore::connect(session_id.clone(), &config).await?
            }
        };
        Ok(Box::new(store))
    }
}

//! Per-session resource assembly
//!
//! [`Engine`] turns an [`EngineConfig`] into a store factory and a log
//! factory once, then hands out [`SessionResources`] per session: the
//! session's store, its audit log and its transport settings. Running the
//! FIX session protocol on top is left to the caller.

use crate::config::{AuditSink, EngineConfig, StoreBackend, StoreConfig};
use anyhow::{Context, Result};
use audit_log::{log_eventf, FileLogFactory, Log, LogFactory, NullLogFactory, TracingLogFactory};
use fix_core::{keys, SessionID, Settings};
use fix_transport::{Connection, SessionChannels, TransportConfig};
use message_store::{
    create_schema, open_pool, AnyPool, Dialect, FileStoreFactory, MemoryStoreFactory, MessageStore,
    MessageStoreFactory, SqlStoreConfig, SqlStoreFactory,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Factories and settings shared by every session
pub struct Engine {
    config: EngineConfig,
    settings: Settings,
    store_factory: Box<dyn MessageStoreFactory>,
    log_factory: Box<dyn LogFactory>,
    shared_pool: Option<AnyPool>,
}

impl Engine {
    /// Build the factories. Settings the chosen backends require are
    /// checked for every session here, before any session is created.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let settings = config.settings()?;

        let (store_factory, shared_pool) = build_store_factory(&config.store, &settings).await?;
        let log_factory = build_log_factory(&config, &settings)?;

        tracing::info!(
            sessions = settings.session_settings().len(),
            store = %config.store.backend,
            audit = ?config.audit.effective_sink(),
            "Engine resources ready"
        );

        Ok(Self { config, settings, store_factory, log_factory, shared_pool })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Configured sessions in a stable order
    pub fn session_ids(&self) -> Vec<SessionID> {
        let mut ids: Vec<_> = self.settings.session_settings().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The engine-wide (non-session) audit log
    pub fn global_log(&self) -> Result<Arc<dyn Log>> {
        self.log_factory.create().context("Failed to create global log")
    }

    /// Open the store and log of one configured session
    pub async fn session(&self, session_id: &SessionID) -> Result<SessionResources> {
        let session_settings = self.settings.session(session_id)?;
        let transport = self
            .config
            .transport
            .clone()
            .with_session_settings(session_settings)
            .with_context(|| format!("Invalid transport settings for {session_id}"))?;

        let log = self
            .log_factory
            .create_session_log(session_id)
            .with_context(|| format!("Failed to create log for {session_id}"))?;

        let store = self
            .store_factory
            .create(session_id)
            .await
            .with_context(|| format!("Failed to open store for {session_id}"))?;

        log_eventf!(
            log,
            "Created session: next sender {}, next target {}",
            store.next_sender_msg_seq_num(),
            store.next_target_msg_seq_num()
        );
        tracing::info!(
            session = %session_id,
            next_sender = store.next_sender_msg_seq_num(),
            next_target = store.next_target_msg_seq_num(),
            "Session resources created"
        );

        Ok(SessionResources { session_id: session_id.clone(), store, log, transport })
    }

    /// Close the shared SQL pool, if any. Stores opened on it must be closed first.
    pub async fn shutdown(self) {
        if let Some(pool) = self.shared_pool {
            pool.close().await;
            tracing::info!("Shared SQL pool closed");
        }
    }
}

async fn build_store_factory(
    store: &StoreConfig,
    settings: &Settings,
) -> Result<(Box<dyn MessageStoreFactory>, Option<AnyPool>)> {
    let debounce = store.target_seqnum_debounce();

    match store.backend {
        StoreBackend::Memory => Ok((Box::new(MemoryStoreFactory::new()) as Box<dyn MessageStoreFactory>, None)),
        StoreBackend::File => {
            for (session_id, session) in settings.session_settings() {
                session
                    .setting(keys::FILE_STORE_PATH)
                    .with_context(|| format!("File store for {session_id}"))?;
            }
            let factory = FileStoreFactory::new(settings.clone()).with_sync_on_write(store.sync_on_write);
            Ok((Box::new(factory) as Box<dyn MessageStoreFactory>, None))
        }
        StoreBackend::Sql => match store.shared_pool() {
            Some((driver, dsn)) => {
                let dialect = Dialect::from_driver(driver)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported SQL driver: {driver}"))?;
                let mut pool_config = SqlStoreConfig::new(driver, dsn);
                pool_config.max_connections = store.max_connections;

                let pool = open_pool(&pool_config).await.context("Failed to open shared SQL pool")?;
                if store.create_schema {
                    create_schema(&pool).await.context("Failed to create store schema")?;
                }
                let factory = SqlStoreFactory::with_shared_pool(settings.clone(), pool.clone(), dialect, debounce);
                Ok((Box::new(factory) as Box<dyn MessageStoreFactory>, Some(pool)))
            }
            None => {
                for (session_id, session) in settings.session_settings() {
                    SqlStoreConfig::from_settings(session, debounce)
                        .with_context(|| format!("SQL store for {session_id}"))?;
                }
                Ok((Box::new(SqlStoreFactory::new(settings.clone(), debounce)) as Box<dyn MessageStoreFactory>, None))
            }
        },
    }
}

fn build_log_factory(config: &EngineConfig, settings: &Settings) -> Result<Box<dyn LogFactory>> {
    let policy = config.audit.redaction.clone();

    let factory: Box<dyn LogFactory> = match config.audit.effective_sink() {
        AuditSink::File => Box::new(
            FileLogFactory::new(settings)
                .context("File audit log")?
                .with_policy(policy)
                .with_display_delimiter(config.audit.display_delimiter_byte()),
        ),
        AuditSink::Tracing => Box::new(TracingLogFactory::new(policy)),
        AuditSink::Null => Box::new(NullLogFactory),
    };
    Ok(factory)
}

/// Everything one session needs to run over a connection
pub struct SessionResources {
    pub session_id: SessionID,
    pub store: Box<dyn MessageStore>,
    pub log: Arc<dyn Log>,
    pub transport: TransportConfig,
}

impl SessionResources {
    /// Start the read and write loops over `stream`
    pub fn attach<S>(&self, stream: S) -> (Connection, SessionChannels)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.log.on_event("Connected");
        tracing::info!(session = %self.session_id, "Connection attached");
        Connection::spawn(stream, &self.transport, self.log.clone())
    }

    /// Flush and close the store
    pub async fn close(mut self) -> Result<()> {
        self.store.close().await.with_context(|| format!("Failed to close store for {}", self.session_id))?;
        self.log.on_event("Session closed");
        Ok(())
    }
}

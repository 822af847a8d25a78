//! Schema bootstrap for the SQL store
//!
//! The same DDL is valid on Postgres and SQLite. Creation time is stored as
//! RFC 3339 text so both backends round-trip it through the same pool type.

use crate::error::Result;
use sqlx::AnyPool;

const CREATE_SESSIONS: &str = "CREATE TABLE IF NOT EXISTS sessions (
    beginstring VARCHAR(8) NOT NULL,
    session_qualifier VARCHAR(64) NOT NULL,
    sendercompid VARCHAR(64) NOT NULL,
    sendersubid VARCHAR(64) NOT NULL,
    senderlocid VARCHAR(64) NOT NULL,
    targetcompid VARCHAR(64) NOT NULL,
    targetsubid VARCHAR(64) NOT NULL,
    targetlocid VARCHAR(64) NOT NULL,
    creation_time VARCHAR(64) NOT NULL,
    incoming_seqnum BIGINT NOT NULL,
    outgoing_seqnum BIGINT NOT NULL,
    PRIMARY KEY (beginstring, session_qualifier,
        sendercompid, sendersubid, senderlocid,
        targetcompid, targetsubid, targetlocid)
)";

const CREATE_MESSAGES: &str = "CREATE TABLE IF NOT EXISTS messages (
    beginstring VARCHAR(8) NOT NULL,
    session_qualifier VARCHAR(64) NOT NULL,
    sendercompid VARCHAR(64) NOT NULL,
    sendersubid VARCHAR(64) NOT NULL,
    senderlocid VARCHAR(64) NOT NULL,
    targetcompid VARCHAR(64) NOT NULL,
    targetsubid VARCHAR(64) NOT NULL,
    targetlocid VARCHAR(64) NOT NULL,
    msgseqnum BIGINT NOT NULL,
    message TEXT NOT NULL
)";

const CREATE_MESSAGES_INDEX: &str = "CREATE INDEX IF NOT EXISTS messages_session_seqnum ON messages (
    beginstring, session_qualifier,
    sendercompid, sendersubid, senderlocid,
    targetcompid, targetsubid, targetlocid,
    msgseqnum
)";

/// Create the `sessions` and `messages` tables if they do not exist
pub async fn create_schema(pool: &AnyPool) -> Result<()> {
    for statement in [CREATE_SESSIONS, CREATE_MESSAGES, CREATE_MESSAGES_INDEX] {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Message store schema ready");
    Ok(())
}

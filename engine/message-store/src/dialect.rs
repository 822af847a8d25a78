//! SQL dialects and the queries built for them
//!
//! Every query is written once with `?` markers and rendered for the store's
//! dialect when the store is constructed. Nothing here is process-global, so
//! stores on different backends can live side by side.

use serde::{Deserialize, Serialize};

/// Placeholder syntax of the backing database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// `$1, $2, ...`
    Postgres,
    /// `?`
    Sqlite,
}

impl Dialect {
    /// Map a driver name to its dialect
    pub fn from_driver(driver: &str) -> Option<Self> {
        match driver.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Render `?` markers in this dialect's placeholder syntax
    pub fn render(self, sql: &str) -> String {
        match self {
            Self::Sqlite => sql.to_string(),
            Self::Postgres => {
                let mut out = String::with_capacity(sql.len() + 16);
                let mut n = 0;
                for c in sql.chars() {
                    if c == '?' {
                        n += 1;
                        out.push('$');
                        out.push_str(&n.to_string());
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}

const SESSION_KEY: &str = "beginstring=? AND session_qualifier=? \
     AND sendercompid=? AND sendersubid=? AND senderlocid=? \
     AND targetcompid=? AND targetsubid=? AND targetlocid=?";

/// Every statement a SQL store issues, rendered for one dialect
#[derive(Debug, Clone)]
pub struct Queries {
    pub select_session: String,
    pub insert_session: String,
    pub update_outgoing: String,
    pub update_incoming: String,
    pub reset_session: String,
    pub delete_messages: String,
    pub insert_message: String,
    pub select_messages: String,
}

impl Queries {
    pub fn new(dialect: Dialect) -> Self {
        let r = |sql: String| dialect.render(&sql);
        Self {
            select_session: r(format!(
                "SELECT creation_time, incoming_seqnum, outgoing_seqnum FROM sessions WHERE {SESSION_KEY}"
            )),
            insert_session: r("INSERT INTO sessions (\
                 creation_time, incoming_seqnum, outgoing_seqnum, \
                 beginstring, session_qualifier, \
                 sendercompid, sendersubid, senderlocid, \
                 targetcompid, targetsubid, targetlocid) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                .to_string()),
            update_outgoing: r(format!("UPDATE sessions SET outgoing_seqnum=? WHERE {SESSION_KEY}")),
            update_incoming: r(format!("UPDATE sessions SET incoming_seqnum=? WHERE {SESSION_KEY}")),
            reset_session: r(format!(
                "UPDATE sessions SET creation_time=?, incoming_seqnum=?, outgoing_seqnum=? WHERE {SESSION_KEY}"
            )),
            delete_messages: r(format!("DELETE FROM messages WHERE {SESSION_KEY}")),
            insert_message: r("INSERT INTO messages (\
                 msgseqnum, message, \
                 beginstring, session_qualifier, \
                 sendercompid, sendersubid, senderlocid, \
                 targetcompid, targetsubid, targetlocid) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                .to_string()),
            select_messages: r(format!(
                "SELECT message FROM messages WHERE {SESSION_KEY} \
                 AND msgseqnum>=? AND msgseqnum<=? ORDER BY msgseqnum"
            )),
        }
    }
}

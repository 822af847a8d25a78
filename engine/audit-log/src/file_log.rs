//! File-backed audit log
//!
//! Each scope (the global log or one session) owns two append-only files
//! under its `FileLogPath`:
//!
//! - `<prefix>.event.current.log`
//! - `<prefix>.messages.current.log`
//!
//! Every record is one line prefixed with a UTC timestamp at microsecond
//! resolution.

use crate::error::{LogError, Result};
use crate::log::{Log, LogFactory};
use crate::redaction::{display_delimited, Direction, RedactionPolicy};
use chrono::Utc;
use fix_core::{keys, ConfigError, SessionID, Settings};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of the log that is not bound to a session
pub const GLOBAL_PREFIX: &str = "GLOBAL";

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// Event and message files of one scope
#[derive(Debug)]
pub struct FileLog {
    prefix: String,
    event_file: Mutex<File>,
    message_file: Mutex<File>,
    policy: Arc<RedactionPolicy>,
    display_delimiter: Option<u8>,
}

impl FileLog {
    /// Create `dir` if needed and open both files for appending
    pub fn open(dir: impl AsRef<Path>, prefix: &str, policy: Arc<RedactionPolicy>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let (event_path, message_path) = Self::paths(dir, prefix);
        let event_file = OpenOptions::new().create(true).append(true).open(event_path)?;
        let message_file = OpenOptions::new().create(true).append(true).open(message_path)?;

        tracing::debug!(prefix, dir = ?dir, "Audit log opened");
        Ok(Self {
            prefix: prefix.to_string(),
            event_file: Mutex::new(event_file),
            message_file: Mutex::new(message_file),
            policy,
            display_delimiter: None,
        })
    }

    /// Paths of the event and message files for `prefix` under `dir`
    pub fn paths(dir: &Path, prefix: &str) -> (PathBuf, PathBuf) {
        (dir.join(format!("{prefix}.event.current.log")), dir.join(format!("{prefix}.messages.current.log")))
    }

    /// Write message records with SOH replaced by `delimiter`
    pub fn with_display_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.display_delimiter = delimiter;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn write_line(&self, file: &Mutex<File>, kind: &str, record: &[u8]) {
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut line = Vec::with_capacity(timestamp.len() + record.len() + 2);
        line.extend_from_slice(timestamp.as_bytes());
        line.push(b' ');
        line.extend(record.iter().map(|&b| if b == b'\n' || b == b'\r' { b' ' } else { b }));
        line.push(b'\n');

        // One write per record keeps lines whole under O_APPEND
        if let Err(e) = file.lock().write_all(&line) {
            report_write_failure(&self.prefix, kind, &e);
        }
    }

    fn write_message(&self, raw: &[u8], direction: Direction) {
        if let Some(record) = self.policy.apply(raw, direction) {
            let record = display_delimited(record, self.display_delimiter);
            self.write_line(&self.message_file, "message", &record);
        }
    }
}

fn report_write_failure(prefix: &str, kind: &str, error: &std::io::Error) {
    if tracing::dispatcher::has_been_set() {
        tracing::error!(prefix, kind, error = %error, "Failed to write audit record");
    } else {
        eprintln!("audit log {prefix}: failed to write {kind} record: {error}");
    }
}

impl Log for FileLog {
    fn on_incoming(&self, raw: &[u8]) {
        self.write_message(raw, Direction::Incoming);
    }

    fn on_outgoing(&self, raw: &[u8]) {
        self.write_message(raw, Direction::Outgoing);
    }

    fn on_event(&self, msg: &str) {
        self.write_line(&self.event_file, "event", msg.as_bytes());
    }
}

/// Creates [`FileLog`]s from `FileLogPath` settings
#[derive(Debug, Clone)]
pub struct FileLogFactory {
    global_log_path: PathBuf,
    session_log_paths: HashMap<SessionID, PathBuf>,
    policy: Arc<RedactionPolicy>,
    display_delimiter: Option<u8>,
}

impl FileLogFactory {
    /// `FileLogPath` must be set globally and resolve for every session.
    /// Nothing is opened until a log is created.
    pub fn new(settings: &Settings) -> Result<Self> {
        let global_log_path = PathBuf::from(settings.global_settings().setting(keys::FILE_LOG_PATH)?);

        let session_log_paths = settings
            .session_settings()
            .iter()
            .map(|(session_id, session)| {
                let path = session.setting(keys::FILE_LOG_PATH)?;
                Ok((session_id.clone(), PathBuf::from(path)))
            })
            .collect::<std::result::Result<HashMap<_, _>, ConfigError>>()?;

        Ok(Self { global_log_path, session_log_paths, policy: Arc::default(), display_delimiter: None })
    }

    pub fn with_policy(mut self, policy: RedactionPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_display_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.display_delimiter = delimiter;
        self
    }

    fn open(&self, dir: &Path, prefix: &str) -> Result<Arc<dyn Log>> {
        let log = FileLog::open(dir, prefix, self.policy.clone())?.with_display_delimiter(self.display_delimiter);
        Ok(Arc::new(log))
    }
}

impl LogFactory for FileLogFactory {
    fn create(&self) -> Result<Arc<dyn Log>> {
        self.open(&self.global_log_path, GLOBAL_PREFIX)
    }

    fn create_session_log(&self, session_id: &SessionID) -> Result<Arc<dyn Log>> {
        let dir = self
            .session_log_paths
            .get(session_id)
            .ok_or_else(|| LogError::Config(ConfigError::UnknownSession(session_id.to_string())))?;
        self.open(dir, &session_id.filename_prefix())
    }
}

//! File-backed store
//!
//! One directory holds five files per session, all named after the session's
//! filename prefix:
//!
//! - `<prefix>.senderseqnums` / `<prefix>.targetseqnums`: [`SequenceFile`] counters
//! - `<prefix>.session`: creation time, RFC 3339
//! - `<prefix>.body`: sent message bodies, appended back to back
//! - `<prefix>.header`: one `seqnum,offset,len` line per body

use crate::config::FileStoreConfig;
use crate::error::{Result, StoreError};
use crate::memory::MemoryStore;
use crate::seqnum_file::SequenceFile;
use crate::store::{validate_seq_num, MessageStore, MessageStoreFactory};
use chrono::{DateTime, Utc};
use fix_core::{keys, SessionID, Settings};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BodyLocation {
    offset: u64,
    len: u64,
}

/// Paths of the files backing one session
#[derive(Debug, Clone)]
struct StorePaths {
    sender_seqnums: PathBuf,
    target_seqnums: PathBuf,
    session: PathBuf,
    body: PathBuf,
    header: PathBuf,
}

impl StorePaths {
    fn new(dir: &Path, session_id: &SessionID) -> Self {
        let prefix = session_id.filename_prefix();
        Self {
            sender_seqnums: dir.join(format!("{prefix}.senderseqnums")),
            target_seqnums: dir.join(format!("{prefix}.targetseqnums")),
            session: dir.join(format!("{prefix}.session")),
            body: dir.join(format!("{prefix}.body")),
            header: dir.join(format!("{prefix}.header")),
        }
    }
}

/// Open file handles and the recovered body index
#[derive(Debug)]
struct OpenFiles {
    sender: SequenceFile,
    target: SequenceFile,
    body: File,
    header: File,
    index: BTreeMap<u64, Vec<BodyLocation>>,
}

/// Message store persisted to plain files
#[derive(Debug)]
pub struct FileStore {
    session_id: SessionID,
    config: FileStoreConfig,
    paths: StorePaths,
    cache: MemoryStore,
    files: Option<OpenFiles>,
}

impl FileStore {
    /// Open (or create) the files for `session_id` under `config.path`
    pub fn open(session_id: SessionID, config: FileStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path)?;
        let paths = StorePaths::new(&config.path, &session_id);

        let (cache, files) = Self::load(&paths)?;
        tracing::info!(
            session = %session_id,
            next_sender = cache.next_sender_msg_seq_num(),
            next_target = cache.next_target_msg_seq_num(),
            "File store opened at {:?}",
            config.path
        );

        Ok(Self { session_id, config, paths, cache, files: Some(files) })
    }

    pub fn session_id(&self) -> &SessionID {
        &self.session_id
    }

    fn load(paths: &StorePaths) -> Result<(MemoryStore, OpenFiles)> {
        let creation_time = match std::fs::read_to_string(&paths.session) {
            Ok(text) => DateTime::parse_from_rfc3339(text.trim())
                .map_err(|e| StoreError::format(format!("bad creation time in {:?}: {e}", paths.session)))?
                .with_timezone(&Utc),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let now = Utc::now();
                write_session_file(&paths.session, now)?;
                now
            }
            Err(e) => return Err(e.into()),
        };

        let sender = SequenceFile::open_or_init(&paths.sender_seqnums, 1)?;
        let target = SequenceFile::open_or_init(&paths.target_seqnums, 1)?;
        let cache = MemoryStore::restore(creation_time, read_seq_num(&sender)?, read_seq_num(&target)?);

        let body = OpenOptions::new().read(true).append(true).create(true).open(&paths.body)?;
        let header = OpenOptions::new().read(true).append(true).create(true).open(&paths.header)?;
        let index = read_index(&paths.header)?;

        Ok((cache, OpenFiles { sender, target, body, header, index }))
    }

    fn files(&self) -> Result<&OpenFiles> {
        self.files.as_ref().ok_or(StoreError::Closed)
    }

    fn files_mut(&mut self) -> Result<&mut OpenFiles> {
        self.files.as_mut().ok_or(StoreError::Closed)
    }
}

fn read_seq_num(file: &SequenceFile) -> Result<u64> {
    match file.read()? {
        0 => Err(StoreError::format(format!("sequence number 0 in {:?}", file.path()))),
        seq_num => Ok(seq_num),
    }
}

/// Replace the session file through a synced temporary and a rename, so
/// readers see either the old creation time or the new one
fn write_session_file(path: &Path, creation_time: DateTime<Utc>) -> Result<()> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = File::create(&tmp_path)?;
    writeln!(file, "{}", creation_time.to_rfc3339())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_index(path: &Path) -> Result<BTreeMap<u64, Vec<BodyLocation>>> {
    let mut index: BTreeMap<u64, Vec<BodyLocation>> = BTreeMap::new();
    let reader = BufReader::new(File::open(path)?);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let bad_line = || StoreError::format(format!("bad header line {} in {path:?}: {line:?}", line_no + 1));
        let mut parts = line.split(',').map(|p| p.trim().parse::<u64>());
        let (Some(Ok(seq_num)), Some(Ok(offset)), Some(Ok(len)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad_line());
        };
        index.entry(seq_num).or_default().push(BodyLocation { offset, len });
    }

    Ok(index)
}

#[async_trait::async_trait]
impl MessageStore for FileStore {
    fn next_sender_msg_seq_num(&self) -> u64 {
        self.cache.next_sender_msg_seq_num()
    }

    fn next_target_msg_seq_num(&self) -> u64 {
        self.cache.next_target_msg_seq_num()
    }

    async fn set_next_sender_msg_seq_num(&mut self, next: u64) -> Result<()> {
        let next = validate_seq_num(next)?;
        let sync = self.config.sync_on_write;
        let files = self.files_mut()?;
        files.sender.write(next)?;
        if sync {
            files.sender.flush()?;
        }
        self.cache.store_next_sender(next);
        Ok(())
    }

    async fn set_next_target_msg_seq_num(&mut self, next: u64) -> Result<()> {
        let next = validate_seq_num(next)?;
        let sync = self.config.sync_on_write;
        let files = self.files_mut()?;
        files.target.write(next)?;
        if sync {
            files.target.flush()?;
        }
        self.cache.store_next_target(next);
        Ok(())
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.cache.creation_time()
    }

    async fn reset(&mut self) -> Result<()> {
        let creation_time = Utc::now();
        let session_path = self.paths.session.clone();
        let files = self.files_mut()?;

        // History goes last: until the new session time and counters are
        // on disk a failed reset leaves the old state whole
        write_session_file(&session_path, creation_time)?;
        files.sender.reset()?;
        files.target.reset()?;
        files.sender.flush()?;
        files.target.flush()?;
        files.body.set_len(0)?;
        files.header.set_len(0)?;
        files.index.clear();

        self.cache.reset_to(creation_time);
        tracing::info!(session = %self.session_id, "File store reset");
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.close().await?;
        let (cache, files) = Self::load(&self.paths)?;
        self.cache = cache;
        self.files = Some(files);
        Ok(())
    }

    async fn save_message(&mut self, seq_num: u64, msg: &[u8]) -> Result<()> {
        let sync = self.config.sync_on_write;
        let files = self.files_mut()?;

        let offset = files.body.metadata()?.len();
        files.body.write_all(msg)?;
        writeln!(files.header, "{},{},{}", seq_num, offset, msg.len())?;
        if sync {
            files.body.sync_data()?;
            files.header.sync_data()?;
        }

        files.index.entry(seq_num).or_default().push(BodyLocation { offset, len: msg.len() as u64 });
        Ok(())
    }

    async fn get_messages(&self, begin: u64, end: u64) -> Result<Vec<Vec<u8>>> {
        let files = self.files()?;
        if begin > end {
            return Ok(Vec::new());
        }

        let mut body = &files.body;
        let mut msgs = Vec::new();
        for location in files.index.range(begin..=end).flat_map(|(_, locations)| locations) {
            let mut buf = vec![0u8; location.len as usize];
            body.seek(SeekFrom::Start(location.offset))?;
            body.read_exact(&mut buf)?;
            msgs.push(buf);
        }
        Ok(msgs)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut files) = self.files.take() {
            files.sender.close()?;
            files.target.close()?;
            files.body.sync_data()?;
            files.header.sync_data()?;
        }
        Ok(())
    }
}

/// Creates file stores from each session's `FileStorePath`
#[derive(Debug, Clone)]
pub struct FileStoreFactory {
    settings: Settings,
    sync_on_write: bool,
}

impl FileStoreFactory {
    pub fn new(settings: Settings) -> Self {
        Self { settings, sync_on_write: false }
    }

    /// Flush counters and bodies to disk on every write
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }
}

#[async_trait::async_trait]
impl MessageStoreFactory for FileStoreFactory {
    async fn create(&self, session_id: &SessionID) -> Result<Box<dyn MessageStore>> {
        let session_settings = self.settings.session(session_id)?;
        let path = session_settings.setting(keys::FILE_STORE_PATH)?;
        let config = FileStoreConfig { path: PathBuf::from(path), sync_on_write: self.sync_on_write };
        Ok(Box::new(FileStore::open(session_id.clone(), config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fix_core::SessionSettings;
    use tempfile::TempDir;

    fn session() -> SessionID {
        SessionID::new("FIX.4.2", "SENDER", "TARGET")
    }

    fn open(dir: &TempDir) -> FileStore {
        FileStore::open(session(), FileStoreConfig::new(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn test_creates_session_files() {
        let temp_dir = TempDir::new().unwrap();
        let _store = open(&temp_dir);

        for suffix in ["senderseqnums", "targetseqnums", "session", "body", "header"] {
            assert!(temp_dir.path().join(format!("FIX.4.2-SENDER-TARGET.{suffix}")).exists(), "{suffix}");
        }
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let created = store.creation_time();

        store.set_next_sender_msg_seq_num(12).await.unwrap();
        store.incr_next_target_msg_seq_num().await.unwrap();
        store.save_message(11, b"8=FIX.4.2\x0135=D\x01").await.unwrap();
        store.close().await.unwrap();

        let reopened = open(&temp_dir);
        assert_eq!(reopened.next_sender_msg_seq_num(), 12);
        assert_eq!(reopened.next_target_msg_seq_num(), 2);
        assert_eq!(reopened.creation_time(), created);
        assert_eq!(reopened.get_messages(11, 11).await.unwrap(), vec![b"8=FIX.4.2\x0135=D\x01".to_vec()]);
    }

    #[tokio::test]
    async fn test_reset_truncates_history() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        store.save_message(1, b"one").await.unwrap();
        store.set_next_sender_msg_seq_num(2).await.unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.next_sender_msg_seq_num(), 1);
        assert!(store.get_messages(1, u64::MAX).await.unwrap().is_empty());

        store.close().await.unwrap();
        let reopened = open(&temp_dir);
        assert!(reopened.get_messages(1, u64::MAX).await.unwrap().is_empty());
        assert_eq!(reopened.next_sender_msg_seq_num(), 1);
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_history_and_counters() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let created = store.creation_time();
        store.save_message(1, b"one").await.unwrap();
        store.set_next_sender_msg_seq_num(2).await.unwrap();
        store.set_next_target_msg_seq_num(5).await.unwrap();

        // Block the session file rewrite, the first step of a reset
        std::fs::create_dir(temp_dir.path().join("FIX.4.2-SENDER-TARGET.session.tmp")).unwrap();
        assert!(matches!(store.reset().await, Err(StoreError::Io(_))));

        assert_eq!(store.next_sender_msg_seq_num(), 2);
        assert_eq!(store.next_target_msg_seq_num(), 5);
        assert_eq!(store.creation_time(), created);
        assert_eq!(store.get_messages(1, 1).await.unwrap(), vec![b"one".to_vec()]);

        store.close().await.unwrap();
        let reopened = open(&temp_dir);
        assert_eq!(reopened.next_sender_msg_seq_num(), 2);
        assert_eq!(reopened.next_target_msg_seq_num(), 5);
        assert_eq!(reopened.creation_time(), created);
        assert_eq!(reopened.get_messages(1, 1).await.unwrap(), vec![b"one".to_vec()]);
    }

    #[tokio::test]
    async fn test_zero_counter_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        open(&temp_dir).close().await.unwrap();
        std::fs::write(temp_dir.path().join("FIX.4.2-SENDER-TARGET.senderseqnums"), "0".repeat(19)).unwrap();

        let err = FileStore::open(session(), FileStoreConfig::new(temp_dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_changes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);

        let mut other = SequenceFile::open(temp_dir.path().join("FIX.4.2-SENDER-TARGET.targetseqnums")).unwrap();
        other.write(77).unwrap();
        other.close().unwrap();

        store.refresh().await.unwrap();
        assert_eq!(store.next_target_msg_seq_num(), 77);
    }

    #[tokio::test]
    async fn test_corrupt_header_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        open(&temp_dir).close().await.unwrap();
        std::fs::write(temp_dir.path().join("FIX.4.2-SENDER-TARGET.header"), "1,0\n").unwrap();

        let err = FileStore::open(session(), FileStoreConfig::new(temp_dir.path())).unwrap_err();
        assert!(matches!(err, StoreError::Format(_)));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(store.set_next_sender_msg_seq_num(3).await, Err(StoreError::Closed)));
        assert_eq!(store.next_sender_msg_seq_num(), 1);
    }

    #[tokio::test]
    async fn test_factory_requires_store_path() {
        let temp_dir = TempDir::new().unwrap();
        let global = SessionSettings::new().with(keys::SENDER_COMP_ID, "SENDER");
        let mut settings = Settings::with_global(global);
        let with_path = settings
            .add_session(
                SessionSettings::new()
                    .with(keys::BEGIN_STRING, "FIX.4.2")
                    .with(keys::TARGET_COMP_ID, "TARGET")
                    .with(keys::FILE_STORE_PATH, temp_dir.path().to_string_lossy()),
            )
            .unwrap();
        let without_path = settings
            .add_session(
                SessionSettings::new().with(keys::BEGIN_STRING, "FIX.4.2").with(keys::TARGET_COMP_ID, "OTHER"),
            )
            .unwrap();

        let factory = FileStoreFactory::new(settings);
        assert!(factory.create(&with_path).await.is_ok());
        assert!(matches!(factory.create(&without_path).await, Err(StoreError::Config(_))));
    }
}

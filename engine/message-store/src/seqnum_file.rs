//! Memory-mapped sequence number counter
//!
//! The file holds a single 19-digit, zero-padded ASCII decimal at offset 0.
//! A write is a copy into the mapped page; the kernel writes it back on its
//! own schedule. Callers that need a durability barrier call [`SequenceFile::flush`].
//!
//! Only one writer per file is supported; concurrent writers need external
//! coordination.

use crate::error::{Result, StoreError};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Width of the encoded counter in bytes
pub const SEQNUM_WIDTH: usize = 19;

const MAX_SEQNUM: u64 = 9_999_999_999_999_999_999;

/// A fixed-width counter persisted through a shared memory map
#[derive(Debug, Default)]
pub struct SequenceFile {
    path: PathBuf,
    file: Option<File>,
    map: Option<MmapMut>,
}

impl SequenceFile {
    /// Open `path`, creating it and zero-extending it to [`SEQNUM_WIDTH`] bytes
    /// when it is absent or too short.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;

        if file.metadata()?.len() < SEQNUM_WIDTH as u64 {
            file.set_len(SEQNUM_WIDTH as u64)?;
        }

        // SAFETY: the map is only written through this instance; single writer
        // per file is part of the contract above.
        let map = unsafe { MmapOptions::new().len(SEQNUM_WIDTH).map_mut(&file)? };

        Ok(Self { path, file: Some(file), map: Some(map) })
    }

    /// Open `path` and write `initial` if the file holds no counter yet
    pub fn open_or_init(path: impl AsRef<Path>, initial: u64) -> Result<Self> {
        let mut seqnum_file = Self::open(path)?;
        if seqnum_file.is_blank()? {
            seqnum_file.write(initial)?;
            seqnum_file.flush()?;
        }
        Ok(seqnum_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.map.is_some()
    }

    /// Parse the stored counter
    pub fn read(&self) -> Result<u64> {
        let map = self.map.as_ref().ok_or(StoreError::Closed)?;
        let field = &map[..SEQNUM_WIDTH];

        let text = std::str::from_utf8(field)
            .map_err(|_| StoreError::format(format!("non-ASCII sequence number in {:?}", self.path)))?;
        text.parse::<u64>()
            .map_err(|e| StoreError::format(format!("bad sequence number {text:?} in {:?}: {e}", self.path)))
    }

    /// Store `seqnum` as zero-padded ASCII
    pub fn write(&mut self, seqnum: u64) -> Result<()> {
        if seqnum > MAX_SEQNUM {
            return Err(StoreError::format(format!("sequence number {seqnum} exceeds {SEQNUM_WIDTH} digits")));
        }
        let map = self.map.as_mut().ok_or(StoreError::Closed)?;
        let encoded = format!("{seqnum:0width$}", width = SEQNUM_WIDTH);
        map[..SEQNUM_WIDTH].copy_from_slice(encoded.as_bytes());
        Ok(())
    }

    /// Force the mapped page to disk
    pub fn flush(&self) -> Result<()> {
        let map = self.map.as_ref().ok_or(StoreError::Closed)?;
        map.flush()?;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.write(1)
    }

    /// Unmap and close. No-op on a closed or never-opened instance.
    pub fn close(&mut self) -> Result<()> {
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        self.file = None;
        Ok(())
    }

    fn is_blank(&self) -> Result<bool> {
        let map = self.map.as_ref().ok_or(StoreError::Closed)?;
        Ok(map[..SEQNUM_WIDTH].iter().all(|b| *b == 0))
    }
}

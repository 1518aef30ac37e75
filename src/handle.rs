//! Per-level file handle management
//!
//! The manager owns at most one open bucket file per severity level. Each
//! level has its own slot behind its own lock; every transition goes through
//! [`HandleManager::ensure_open`], so concurrent writers of one level are
//! serialized and can never leave two handles open for it.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::bucket::{resolve_path, BucketWidth};
use crate::entry::{is_header, parse_header};
use crate::level::{Level, LEVEL_COUNT};
use crate::metrics::MetricsCollector;

/// An append-only bucket file
pub trait BucketFile: Send {
    /// Append a full record and flush it to the OS
    fn append(&mut self, record: &[u8]) -> io::Result<()>;

    /// Force appended data to durable storage
    fn sync(&mut self) -> io::Result<()>;

    /// Current length of the file in bytes
    fn len(&self) -> io::Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl BucketFile for File {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.write_all(record)?;
        self.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Opens bucket files for appending
pub trait FileOpener: Send + Sync {
    /// Open `path` in append mode, creating it if needed
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn BucketFile>>;
}

/// Opener for the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOpener;

impl FileOpener for FsOpener {
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn BucketFile>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }
}

/// Opener whose bucket files print to standard output
///
/// Nothing reaches the directory, so queries against such a store find no
/// records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleOpener;

impl FileOpener for ConsoleOpener {
    fn open_append(&self, _path: &Path) -> io::Result<Box<dyn BucketFile>> {
        Ok(Box::new(ConsoleFile))
    }
}

struct ConsoleFile;

impl BucketFile for ConsoleFile {
    fn append(&mut self, record: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(record)?;
        out.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(0)
    }

    fn truncate(&mut self, _len: u64) -> io::Result<()> {
        Ok(())
    }
}

/// An open handle and the bucket it belongs to
pub struct OpenHandle {
    /// Start of the bucket the handle writes into
    pub bucket_start: NaiveDateTime,
    /// Path of the bucket file
    pub path: PathBuf,
    /// The file itself
    pub file: Box<dyn BucketFile>,
    /// Newest record timestamp in the file, if it holds any
    pub last_timestamp: Option<NaiveDateTime>,
}

impl fmt::Debug for OpenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenHandle")
            .field("bucket_start", &self.bucket_start)
            .field("path", &self.path)
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

/// Newest header timestamp in an existing bucket file
///
/// A missing file holds no records. Lines that do not parse as headers are
/// ignored.
pub fn last_record_timestamp(path: &Path) -> io::Result<Option<NaiveDateTime>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.strip_suffix('\n').unwrap_or(&line);
        if !is_header(line) {
            continue;
        }
        if let Ok(header) = parse_header(line) {
            last = last.max(Some(header.timestamp));
        }
    }
    Ok(last)
}

/// State of one level's slot
#[derive(Debug, Default)]
pub enum HandleState {
    /// No file open for the level
    #[default]
    Closed,
    /// A file is open for one bucket
    Open(OpenHandle),
}

impl HandleState {
    /// Bucket of the open handle, if any
    pub fn bucket_start(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Closed => None,
            Self::Open(handle) => Some(handle.bucket_start),
        }
    }

    /// Newest record timestamp of the open handle's file
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Closed => None,
            Self::Open(handle) => handle.last_timestamp,
        }
    }

    /// Borrow the open handle, if any
    pub fn handle_mut(&mut self) -> Option<&mut OpenHandle> {
        match self {
            Self::Closed => None,
            Self::Open(handle) => Some(handle),
        }
    }
}

/// Owner of the per-level open bucket files
pub struct HandleManager {
    dir: PathBuf,
    width: BucketWidth,
    sync_on_close: bool,
    opener: Arc<dyn FileOpener>,
    slots: [Mutex<HandleState>; LEVEL_COUNT],
    metrics: Arc<MetricsCollector>,
}

impl fmt::Debug for HandleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleManager")
            .field("dir", &self.dir)
            .field("width", &self.width)
            .field("sync_on_close", &self.sync_on_close)
            .finish()
    }
}

impl HandleManager {
    /// Create a manager writing into `dir`
    pub fn new(
        dir: impl Into<PathBuf>,
        width: BucketWidth,
        sync_on_close: bool,
        opener: Arc<dyn FileOpener>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            dir: dir.into(),
            width,
            sync_on_close,
            opener,
            slots: Default::default(),
            metrics,
        }
    }

    /// Directory the bucket files live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bucket width used for path resolution
    pub fn width(&self) -> BucketWidth {
        self.width
    }

    /// Path of a level's bucket file
    pub fn path_for(&self, level: Level, bucket_start: NaiveDateTime) -> PathBuf {
        resolve_path(&self.dir, level, bucket_start, self.width)
    }

    /// Lock a level's slot without changing it
    pub fn lock(&self, level: Level) -> MutexGuard<'_, HandleState> {
        self.slots[level.index()].lock()
    }

    /// Make sure the level's handle is open for `bucket_start`
    ///
    /// Opens the file when the slot is closed and rotates when it is open for
    /// another bucket. The returned guard keeps the level locked so the caller
    /// can append without racing another rotation.
    pub fn ensure_open(&self, level: Level, bucket_start: NaiveDateTime) -> io::Result<MutexGuard<'_, HandleState>> {
        let mut slot = self.lock(level);
        self.ensure_open_locked(level, &mut slot, bucket_start)?;
        Ok(slot)
    }

    /// Same as [`ensure_open`](Self::ensure_open) on an already locked slot
    pub fn ensure_open_locked(
        &self,
        level: Level,
        slot: &mut HandleState,
        bucket_start: NaiveDateTime,
    ) -> io::Result<()> {
        match slot.bucket_start() {
            Some(current) if current == bucket_start => return Ok(()),
            Some(current) => {
                debug!(level = %level, from = %current, to = %bucket_start, "rotating bucket file");
                self.close_locked(level, slot);
                self.metrics.increment_rotations();
            }
            None => {}
        }

        let path = self.path_for(level, bucket_start);
        let file = self.opener.open_append(&path)?;
        let last_timestamp = last_record_timestamp(&path)?;
        debug!(level = %level, path = %path.display(), last = ?last_timestamp, "opened bucket file");
        self.metrics.increment_handles_opened();

        *slot = HandleState::Open(OpenHandle {
            bucket_start,
            path,
            file,
            last_timestamp,
        });

        Ok(())
    }

    /// Close the level's handle; a closed slot is left alone
    pub fn close(&self, level: Level) {
        let mut slot = self.lock(level);
        self.close_locked(level, &mut slot);
    }

    /// Close an already locked slot
    pub fn close_locked(&self, level: Level, slot: &mut HandleState) {
        if let HandleState::Open(mut handle) = std::mem::take(slot) {
            if self.sync_on_close {
                if let Err(e) = handle.file.sync() {
                    debug!(level = %level, path = %handle.path.display(), error = %e, "sync on close failed");
                }
            }
            debug!(level = %level, path = %handle.path.display(), "closed bucket file");
        }
    }

    /// Close every open handle
    pub fn close_all(&self) {
        for level in Level::all() {
            self.close(level);
        }
    }

    /// Bucket the level's handle is currently open for
    pub fn open_bucket(&self, level: Level) -> Option<NaiveDateTime> {
        self.lock(level).bucket_start()
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        Level::all()
            .iter()
            .filter(|level| self.open_bucket(**level).is_some())
            .count()
    }
}

impl Drop for HandleManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

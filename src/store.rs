use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::boundary::{AccessPolicy, Ack, IngestRecord, QueryRecord, QueryRequest};
use crate::bucket::{list_buckets, Bucket, BucketWidth, Clock};
use crate::config::StoreConfig;
use crate::entry::LogEntry;
use crate::error::{Error, Result};
use crate::handle::{ConsoleOpener, FileOpener, FsOpener, HandleManager};
use crate::level::Level;
use crate::metrics::{MetricsCollector, StoreStats};
use crate::query::{QueryEngine, TimeRange};
use crate::writer::{RecordWriter, RetryPolicy};

/// A directory of bucketed log files
pub struct LogStore {
    /// Directory holding the bucket files
    dir: PathBuf,
    /// Store configuration
    config: StoreConfig,
    /// Validated bucket width
    width: BucketWidth,
    /// Time source for stamping and zone conversion
    clock: Arc<dyn Clock>,
    /// Per-level open files
    handles: Arc<HandleManager>,
    /// Write path
    writer: RecordWriter,
    /// Read path
    engine: QueryEngine,
    /// Admission rules for the routing layer
    policy: AccessPolicy,
    /// Store is open flag
    is_open: RwLock<bool>,
    /// Metrics collector
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("dir", &self.dir)
            .field("width", &self.width)
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl LogStore {
    /// Open a store on the real filesystem, or on standard output when
    /// `console_output` is set
    pub fn open(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let opener: Arc<dyn FileOpener> = if config.console_output {
            Arc::new(ConsoleOpener)
        } else {
            Arc::new(FsOpener)
        };
        Self::with_opener(config, clock, opener)
    }

    /// Open a store whose bucket files are opened through `opener`
    pub fn with_opener(config: StoreConfig, clock: Arc<dyn Clock>, opener: Arc<dyn FileOpener>) -> Result<Self> {
        config.validate()?;
        let width = config.bucket_width()?;

        let dir = config.directory.clone();
        if !config.console_output {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::storage(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }

        let metrics = Arc::new(if config.collect_metrics {
            MetricsCollector::new()
        } else {
            MetricsCollector::disabled()
        });

        let handles = Arc::new(HandleManager::new(
            dir.clone(),
            width,
            config.sync_writes,
            opener,
            metrics.clone(),
        ));

        let retry = RetryPolicy {
            max_retries: config.write_retries,
            backoff: config.write_retry_backoff(),
        };
        let writer = RecordWriter::new(handles.clone(), clock.clone(), retry, config.sync_writes, metrics.clone());

        let engine = QueryEngine::new(
            dir.clone(),
            width,
            config.malformed_line_policy,
            config.parallel_query_execution,
            metrics.clone(),
        );

        let policy = AccessPolicy::from_config(&config);

        info!(dir = %dir.display(), width = %width, console = config.console_output, "log store opened");

        Ok(Self {
            dir,
            config,
            width,
            clock,
            handles,
            writer,
            engine,
            policy,
            is_open: RwLock::new(true),
            metrics,
        })
    }

    /// Append an entry to the bucket its timestamp falls in
    ///
    /// An entry older than the newest record of its bucket file is rejected
    /// with [`Error::OutOfOrder`]. Returns the number of bytes appended.
    pub fn write(&self, entry: &LogEntry) -> Result<usize> {
        self.ensure_open()?;
        self.writer.write(entry)
    }

    /// Stamp a record with the current local time and append it
    pub fn log(
        &self,
        level: Level,
        logger_name: &str,
        origin_line: Option<u32>,
        message: &str,
        detail: Vec<String>,
    ) -> Result<LogEntry> {
        self.ensure_open()?;
        let mut entry = LogEntry::new(self.clock.now_local(), level, logger_name, message).with_detail(detail);
        entry.origin_line = origin_line;
        self.writer.write_stamped(entry)
    }

    /// Persist a client record, stamped with the current local time
    pub fn ingest(&self, record: IngestRecord) -> Result<Ack> {
        self.ensure_open()?;
        let entry = record.into_entry(self.clock.now_local())?;
        self.writer.write_stamped(entry)?;
        Ok(Ack::ok())
    }

    /// Entries of `level` in `[start, end)` of local wall time
    pub fn query(&self, level: Level, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<LogEntry>> {
        self.query_range(level, TimeRange::new(start, end))
    }

    /// Entries of `level` inside `range`
    pub fn query_range(&self, level: Level, range: TimeRange) -> Result<Vec<LogEntry>> {
        self.ensure_open()?;
        self.engine.query(level, &range)
    }

    /// Answer a client's one-day query
    pub fn query_day(&self, request: &QueryRequest) -> Result<Vec<QueryRecord>> {
        let level = request.level()?;
        let range = request.range(self.clock.as_ref())?;
        debug!(level = %level, date = %request.date, start = %range.start, "day query");

        let entries = self.query_range(level, range)?;
        Ok(entries
            .into_iter()
            .map(|entry| QueryRecord::from_entry(entry, self.clock.as_ref()))
            .collect())
    }

    /// Existing bucket files of a level, oldest first
    pub fn buckets(&self, level: Level) -> Result<Vec<(Bucket, PathBuf)>> {
        self.ensure_open()?;
        list_buckets(&self.dir, level, self.width)
    }

    /// Bucket the level's handle is currently open for
    pub fn open_bucket(&self, level: Level) -> Option<NaiveDateTime> {
        self.handles.open_bucket(level)
    }

    /// Snapshot of the store's counters
    pub fn stats(&self) -> StoreStats {
        self.metrics.snapshot()
    }

    /// Close every open file; later operations fail
    pub fn close(&self) {
        {
            let mut is_open = self.is_open.write();
            if !*is_open {
                return;
            }
            *is_open = false;
        }

        self.handles.close_all();
        info!(dir = %self.dir.display(), "log store closed");
    }

    /// Check if the store is open
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Get the store's directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the store's configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the store's bucket width
    pub fn width(&self) -> BucketWidth {
        self.width
    }

    /// Get the store's clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the admission rules derived from the configuration
    pub fn access_policy(&self) -> &AccessPolicy {
        &self.policy
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::storage("store is closed"));
        }
        Ok(())
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.close();
    }
}

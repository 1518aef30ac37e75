//! Durable write path
//!
//! Serializes an entry, routes it to its level's bucket file and appends it
//! with an immediate flush. Timestamps never decrease within a file: entries
//! stamped here take the clock reading under the level's lock, and explicit
//! entries older than the file's newest record are rejected. A failed append
//! is rolled back to the previous file length, the handle is reopened after a
//! fixed pause and the append is tried once more. A second failure is
//! returned to the caller.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use chrono::{NaiveDateTime, SubsecRound};
use tracing::{error, warn};

use crate::bucket::{bucket_start, Clock};
use crate::entry::LogEntry;
use crate::error::{Error, Result};
use crate::handle::{HandleManager, HandleState};
use crate::level::Level;
use crate::metrics::MetricsCollector;

/// Bounded retry for failed appends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Appends entries to their bucket files
pub struct RecordWriter {
    handles: Arc<HandleManager>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    sync_writes: bool,
    metrics: Arc<MetricsCollector>,
}

impl fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordWriter")
            .field("handles", &self.handles)
            .field("retry", &self.retry)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RecordWriter {
    /// Create a writer on top of a handle manager
    pub fn new(
        handles: Arc<HandleManager>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        sync_writes: bool,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            handles,
            clock,
            retry,
            sync_writes,
            metrics,
        }
    }

    /// The retry policy in use
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Stamp an entry with the current local time and append it
    ///
    /// The clock is read after the level's lock is taken, so the order of
    /// records in a file is the order of their timestamps. If the clock reads
    /// earlier than the newest record of the current bucket, the entry takes
    /// that record's timestamp instead. Returns the entry as persisted.
    pub fn write_stamped(&self, mut entry: LogEntry) -> Result<LogEntry> {
        let level = entry.level;
        let width = self.handles.width();
        let mut slot = self.handles.lock(level);

        let now = self.clock.now_local().trunc_subsecs(3);
        let bucket = bucket_start(now, width);

        self.append_with_retry(level, &mut slot, bucket, |last| {
            entry.timestamp = match last {
                Some(last) if last > now && bucket_start(last, width) == bucket => last,
                _ => now,
            };
            Ok((entry.timestamp, entry.to_record()))
        })?;
        Ok(entry)
    }

    /// Append an entry to the bucket its timestamp falls in
    ///
    /// Backfilling an older bucket is allowed, but an entry older than the
    /// newest record already in its bucket file is rejected with
    /// [`Error::OutOfOrder`]. Returns the number of bytes appended.
    pub fn write(&self, entry: &LogEntry) -> Result<usize> {
        let level = entry.level;
        let bucket = bucket_start(entry.timestamp, self.handles.width());
        let record = entry.to_record();
        let mut slot = self.handles.lock(level);

        self.append_with_retry(level, &mut slot, bucket, |last| match last {
            Some(last) if entry.timestamp < last => {
                let path = self.handles.path_for(level, bucket);
                warn!(
                    level = %level,
                    path = %path.display(),
                    timestamp = %entry.timestamp,
                    last = %last,
                    "rejecting entry older than its bucket file"
                );
                Err(Error::out_of_order(path, entry.timestamp, last))
            }
            _ => Ok((entry.timestamp, record.clone())),
        })
    }

    /// Append on a locked slot with the bounded retry
    ///
    /// `prepare` sees the newest timestamp of the freshly opened file and
    /// returns the record to append with its timestamp. Its errors end the
    /// write without a retry.
    fn append_with_retry<F>(
        &self,
        level: Level,
        slot: &mut HandleState,
        bucket: NaiveDateTime,
        mut prepare: F,
    ) -> Result<usize>
    where
        F: FnMut(Option<NaiveDateTime>) -> Result<(NaiveDateTime, String)>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        // The slot stays locked across retries so records of one level keep their order
        loop {
            attempt += 1;

            let (path, outcome) = match self.handles.ensure_open_locked(level, slot, bucket) {
                Ok(()) => {
                    let (timestamp, record) = prepare(slot.last_timestamp())?;
                    let (path, result) = self.append_locked(slot, record.as_bytes(), timestamp);
                    (path, result.map(|()| record.len()))
                }
                Err(e) => (self.handles.path_for(level, bucket), Err(e)),
            };

            match outcome {
                Ok(len) => {
                    self.metrics.record_write(len, start.elapsed());
                    return Ok(len);
                }
                Err(e) if attempt < self.retry.max_attempts() => {
                    warn!(
                        level = %level,
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "append failed, retrying in {:?}",
                        self.retry.backoff
                    );
                    self.metrics.increment_write_retries();
                    self.handles.close_locked(level, slot);
                    thread::sleep(self.retry.backoff);
                }
                Err(e) => {
                    error!(level = %level, path = %path.display(), attempt, error = %e, "append failed");
                    self.metrics.increment_write_failures();
                    self.handles.close_locked(level, slot);
                    return Err(Error::write(path, attempt, e));
                }
            }
        }
    }

    /// Append to the open handle, rolling back a partial append on failure
    fn append_locked(
        &self,
        slot: &mut HandleState,
        record: &[u8],
        timestamp: NaiveDateTime,
    ) -> (PathBuf, io::Result<()>) {
        let handle = match slot.handle_mut() {
            Some(handle) => handle,
            None => {
                return (
                    PathBuf::new(),
                    Err(io::Error::new(io::ErrorKind::NotConnected, "no open handle")),
                )
            }
        };

        let path = handle.path.clone();
        let before = handle.file.len();

        let mut result = handle.file.append(record);
        if result.is_ok() && self.sync_writes {
            result = handle.file.sync();
        }

        if result.is_ok() {
            handle.last_timestamp = handle.last_timestamp.max(Some(timestamp));
        } else if let Ok(len) = before {
            // Best effort: the handle is discarded right after
            if let Err(e) = handle.file.truncate(len) {
                warn!(path = %path.display(), error = %e, "could not roll back partial append");
            }
        }

        (path, result)
    }

    /// Close the handle of a level
    pub fn close(&self, level: Level) {
        self.handles.close(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketWidth, FixedClock};
    use crate::handle::FsOpener;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::path::Path;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap().and_hms_milli_opt(h, m, s, ms).unwrap()
    }

    fn writer(dir: &Path, clock: Arc<FixedClock>) -> (RecordWriter, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new());
        let handles = Arc::new(HandleManager::new(
            dir,
            BucketWidth::HOURLY,
            false,
            Arc::new(FsOpener),
            metrics.clone(),
        ));
        (RecordWriter::new(handles, clock, RetryPolicy::default(), true, metrics.clone()), metrics)
    }

    #[test]
    fn test_write_appends_record() -> Result<()> {
        let temp_dir = tempdir()?;
        let (writer, metrics) = writer(temp_dir.path(), Arc::new(FixedClock::at_local(at(12, 0, 0, 0))));

        let entry = LogEntry::new(at(10, 15, 0, 42), Level::Warning, "disk", "usage at 91%").with_detail(["sda1"]);
        let written = writer.write(&entry)?;

        let contents = std::fs::read_to_string(temp_dir.path().join("warn_2024-05-15_10.log"))?;
        assert_eq!(contents, "[2024-05-15 10:15:00.042] WARN:disk:- usage at 91%\nsda1\n");
        assert_eq!(written, contents.len());
        assert_eq!(metrics.get_write_count(), 1);
        assert_eq!(metrics.get_bytes_written(), written);
        Ok(())
    }

    #[test]
    fn test_older_entry_rejected() -> Result<()> {
        let temp_dir = tempdir()?;
        let (writer, metrics) = writer(temp_dir.path(), Arc::new(FixedClock::at_local(at(12, 0, 0, 0))));

        writer.write(&LogEntry::new(at(10, 30, 0, 0), Level::Error, "a", "later"))?;
        let err = writer.write(&LogEntry::new(at(10, 10, 0, 0), Level::Error, "a", "earlier")).unwrap_err();
        assert!(err.is_out_of_order_error());

        // Equal timestamps keep the file ordered
        writer.write(&LogEntry::new(at(10, 30, 0, 0), Level::Error, "a", "same"))?;

        let contents = std::fs::read_to_string(temp_dir.path().join("error_2024-05-15_10.log"))?;
        assert!(!contents.contains("earlier"));
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(metrics.get_write_count(), 2);
        Ok(())
    }

    #[test]
    fn test_stamped_under_lock() -> Result<()> {
        let temp_dir = tempdir()?;
        let clock = Arc::new(FixedClock::at_local(at(10, 5, 0, 0)));
        let (writer, _) = writer(temp_dir.path(), clock.clone());

        let placeholder = at(23, 0, 0, 0);
        let first = writer.write_stamped(LogEntry::new(placeholder, Level::Info, "svc", "one"))?;
        assert_eq!(first.timestamp, at(10, 5, 0, 0));

        // A clock stepping back inside the bucket does not reorder the file
        clock.advance(ChronoDuration::minutes(-2));
        let second = writer.write_stamped(LogEntry::new(placeholder, Level::Info, "svc", "two"))?;
        assert_eq!(second.timestamp, at(10, 5, 0, 0));

        // Stepping back across a bucket edge writes into the earlier bucket
        clock.advance(ChronoDuration::minutes(-10));
        let third = writer.write_stamped(LogEntry::new(placeholder, Level::Info, "svc", "three"))?;
        assert_eq!(third.timestamp, at(9, 53, 0, 0));
        assert!(temp_dir.path().join("info_2024-05-15_09.log").exists());
        assert!(!temp_dir.path().join("info_2024-05-15_23.log").exists());
        Ok(())
    }

    #[test]
    fn test_retry_policy_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 2);
        let none = RetryPolicy {
            max_retries: 0,
            backoff: Duration::ZERO,
        };
        assert_eq!(none.max_attempts(), 1);
    }
}

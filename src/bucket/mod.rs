//! Time-based bucketing of log files
//!
//! Every severity level is sharded into fixed-width time buckets. Each bucket
//! maps to exactly one append-only text file; the file exists once at least
//! one entry has been written into the bucket.

mod clock;
mod path;
mod width;

pub use clock::{Clock, FixedClock, SystemClock};
pub use path::{file_name, list_buckets, parse_file_name, resolve_path, FILE_DATE_FORMAT};
pub use width::{bucket_start, buckets_covering, BucketIter, BucketWidth, DAY_SECS, MIN_BUCKET_SECS};

use chrono::NaiveDateTime;

use crate::level::Level;

/// A `(level, bucket start)` pair identifying one log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    /// Severity level the bucket belongs to
    pub level: Level,
    /// Local wall time the bucket starts at
    pub start: NaiveDateTime,
}

impl Bucket {
    /// Create a new bucket identifier
    pub fn new(level: Level, start: NaiveDateTime) -> Self {
        Self { level, start }
    }

    /// Bucket containing a local timestamp
    pub fn containing(level: Level, local: NaiveDateTime, width: BucketWidth) -> Self {
        Self::new(level, bucket_start(local, width))
    }

    /// Exclusive end of the bucket
    pub fn end(&self, width: BucketWidth) -> NaiveDateTime {
        self.start + width.as_chrono()
    }

    /// Check if a local timestamp falls inside the bucket
    pub fn contains(&self, local: NaiveDateTime, width: BucketWidth) -> bool {
        local >= self.start && local < self.end(width)
    }
}

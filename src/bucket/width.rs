//! Bucket width and interval arithmetic
//!
//! Buckets are aligned to multiples of their width counted from the Unix
//! epoch on the local wall-clock timeline.

use std::fmt;
use std::time::Duration;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime};

use crate::error::{Error, Result};

/// Smallest supported bucket width in seconds
pub const MIN_BUCKET_SECS: u64 = 60 * 60;

/// Seconds in a day; widths at or above this use daily file names
pub const DAY_SECS: u64 = 24 * 60 * 60;

/// Width of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketWidth(u64);

impl BucketWidth {
    /// One-hour buckets
    pub const HOURLY: Self = Self(MIN_BUCKET_SECS);
    /// One-day buckets
    pub const DAILY: Self = Self(DAY_SECS);

    /// Create a width from whole seconds, rejecting anything below one hour
    pub fn from_secs(secs: u64) -> Result<Self> {
        if secs < MIN_BUCKET_SECS {
            return Err(Error::config(format!(
                "Bucket width of {}s is below the 1 hour minimum",
                secs
            )));
        }
        if secs > i64::MAX as u64 / 1000 {
            return Err(Error::config(format!("Bucket width of {}s is too large", secs)));
        }
        Ok(Self(secs))
    }

    /// Create a width from whole hours
    pub fn from_hours(hours: u64) -> Result<Self> {
        Self::from_secs(hours.saturating_mul(60 * 60))
    }

    /// Width in seconds
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Width as a std duration
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    /// Width as a chrono duration
    pub fn as_chrono(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.0 as i64)
    }

    /// Whether file names for this width carry only a date
    pub fn is_daily(&self) -> bool {
        self.0 >= DAY_SECS
    }

    fn as_millis(&self) -> i64 {
        self.0 as i64 * 1000
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self::DAILY
    }
}

impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % DAY_SECS == 0 {
            write!(f, "{}d", self.0 / DAY_SECS)
        } else if self.0 % MIN_BUCKET_SECS == 0 {
            write!(f, "{}h", self.0 / MIN_BUCKET_SECS)
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

/// Start of the bucket containing a local timestamp
///
/// Rounds down, so a timestamp exactly on a boundary belongs to the bucket
/// starting there.
pub fn bucket_start(local: NaiveDateTime, width: BucketWidth) -> NaiveDateTime {
    let millis = local.and_utc().timestamp_millis();
    let width_ms = width.as_millis();
    let start = millis - millis.rem_euclid(width_ms);
    match DateTime::from_timestamp_millis(start) {
        Some(dt) => dt.naive_utc(),
        None => local,
    }
}

/// Ascending starts of every bucket overlapping `[start, end)`
///
/// An empty range overlaps no bucket.
pub fn buckets_covering(start: NaiveDateTime, end: NaiveDateTime, width: BucketWidth) -> BucketIter {
    BucketIter {
        next: if start < end { bucket_start(start, width) } else { end },
        end,
        step: width.as_chrono(),
    }
}

/// Iterator over bucket starts, see [`buckets_covering`]
#[derive(Debug, Clone)]
pub struct BucketIter {
    next: NaiveDateTime,
    end: NaiveDateTime,
    step: ChronoDuration,
}

impl Iterator for BucketIter {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = match current.checked_add_signed(self.step) {
            Some(next) => next,
            None => self.end,
        };
        Some(current)
    }
}

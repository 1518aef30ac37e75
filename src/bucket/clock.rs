//! Wall clock abstraction
//!
//! Persisted timestamps are naive server-local wall time. The local UTC offset
//! is looked up on every conversion instead of being captured once, so a
//! daylight-saving change while the process runs moves bucket boundaries with
//! the wall clock.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of the current time and of the server's local UTC offset
pub trait Clock: Send + Sync {
    /// Current instant
    fn now_utc(&self) -> DateTime<Utc>;

    /// Local offset in effect at an instant
    fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset;

    /// Local offset in effect at a local wall time
    ///
    /// Ambiguous wall times (clocks set back) resolve to the earlier offset.
    fn offset_for_local(&self, local: NaiveDateTime) -> FixedOffset;

    /// Current local wall time
    fn now_local(&self) -> NaiveDateTime {
        self.to_local(self.now_utc())
    }

    /// Convert an instant to local wall time
    fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.naive_utc() + ChronoDuration::seconds(self.offset_at(at).local_minus_utc() as i64)
    }

    /// Convert a local wall time back to an instant
    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let offset = self.offset_for_local(local);
        (local - ChronoDuration::seconds(offset.local_minus_utc() as i64)).and_utc()
    }
}

/// Clock backed by the operating system's time and timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc()).fix()
    }

    fn offset_for_local(&self, local: NaiveDateTime) -> FixedOffset {
        match Local.offset_from_local_datetime(&local).earliest() {
            Some(offset) => offset.fix(),
            // Skipped wall time (clocks set forward): use the offset just before the gap
            None => self.offset_at((local - ChronoDuration::hours(1)).and_utc()),
        }
    }
}

/// Manually driven clock with a fixed offset
///
/// Used by tests and tools that need deterministic bucketing.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    /// Create a clock frozen at `now`, reporting `offset` as local offset
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Create a UTC clock whose local time is `local`
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self::new(local.and_utc(), Utc.fix())
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock so that local time reads `local`
    pub fn set_local(&self, local: NaiveDateTime) {
        let utc = local - ChronoDuration::seconds(self.offset.local_minus_utc() as i64);
        self.set(utc.and_utc());
    }

    /// Advance the clock
    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn offset_at(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }

    fn offset_for_local(&self, _local: NaiveDateTime) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_fixed_clock_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap(), offset);

        assert_eq!(clock.now_local(), local(10, 0));
        assert_eq!(clock.to_utc(local(10, 0)), clock.now_utc());
    }

    #[test]
    fn test_fixed_clock_moves() {
        let clock = FixedClock::at_local(local(9, 0));
        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(clock.now_local(), local(9, 30));

        clock.set_local(local(23, 59));
        assert_eq!(clock.now_local(), local(23, 59));
    }

    #[test]
    fn test_system_clock_round_trip() {
        let clock = SystemClock;
        let now = clock.now_utc();
        let local = clock.to_local(now);
        let back = clock.to_utc(local);
        // Only differs inside an ambiguous DST hour
        assert!((back - now).num_seconds().abs() <= 3600);
    }
}

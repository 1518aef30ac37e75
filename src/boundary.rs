//! Payloads exchanged with the routing layer
//!
//! The HTTP service in front of the store hands over ingestion and query
//! payloads in these shapes and applies [`AccessPolicy`] before forwarding
//! anything. Nothing here touches the filesystem.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::bucket::Clock;
use crate::config::StoreConfig;
use crate::entry::LogEntry;
use crate::error::{Error, Result};
use crate::level::Level;
use crate::query::TimeRange;

/// Date layout of query requests
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Zone assumed when a query names none
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// A log record as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    /// Logger name
    pub name: String,
    /// Numeric severity
    #[serde(default)]
    pub levelno: Option<u32>,
    /// Symbolic severity
    #[serde(default)]
    pub levelname: Option<String>,
    /// Source file of the emitting call
    #[serde(default)]
    pub pathname: Option<String>,
    /// Source line of the emitting call
    #[serde(default)]
    pub lineno: Option<u32>,
    /// Message, possibly spanning several lines
    pub msg: String,
    /// Stack trace lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    /// Formatting arguments, carried but unused
    #[serde(default)]
    pub args: serde_json::Value,
}

impl IngestRecord {
    /// Parse a record from a JSON payload
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Severity of the record; `levelname` wins over `levelno`
    pub fn level(&self) -> Result<Level> {
        if let Some(name) = &self.levelname {
            if let Ok(level) = name.parse::<Level>() {
                return Ok(level);
            }
        }

        match (self.levelno, &self.levelname) {
            (Some(levelno), _) => Level::from_levelno(levelno),
            (None, Some(name)) => Err(Error::level(name.as_str())),
            (None, None) => Err(Error::level("<missing>")),
        }
    }

    /// Build the entry to persist, stamped with `timestamp`
    ///
    /// The first line of `msg` becomes the message. Its remaining lines and
    /// then the trace lines become detail.
    pub fn into_entry(self, timestamp: NaiveDateTime) -> Result<LogEntry> {
        let level = self.level()?;

        let mut lines = self.msg.split('\n');
        let message = lines.next().unwrap_or_default().to_string();
        let mut detail: Vec<String> = lines.map(str::to_string).collect();
        if let Some(trace) = self.trace {
            detail.extend(trace);
        }

        let mut entry = LogEntry::new(timestamp, level, self.name, message).with_detail(detail);
        entry.origin_line = self.lineno;
        Ok(entry)
    }
}

/// Acknowledgement returned for an ingested record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the record was persisted
    pub status: bool,
}

impl Ack {
    /// The record was persisted
    pub fn ok() -> Self {
        Self { status: true }
    }

    /// The record was refused or could not be written
    pub fn failed() -> Self {
        Self { status: false }
    }
}

/// One day's worth of entries of a level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Level display string, e.g. `ERROR` or `WARN`
    pub level: String,
    /// Calendar day in the caller's zone, `%Y-%m-%d`
    pub date: String,
    /// IANA zone name; UTC when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl QueryRequest {
    /// Create a request for `date` in UTC
    pub fn new(level: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            date: date.into(),
            timezone: None,
        }
    }

    /// Set the caller's zone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Requested level
    pub fn level(&self) -> Result<Level> {
        self.level.parse()
    }

    /// Caller's zone
    pub fn timezone(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse::<Tz>()
            .map_err(|_| Error::timestamp(format!("Unknown timezone: {}", name)))
    }

    /// The requested day as a range of server-local wall time
    ///
    /// Midnight is localised in the caller's zone and the day spans the
    /// following 24 hours. Both ends are converted to server-local time
    /// through `clock` separately, so a server offset change inside the day
    /// moves the end with it.
    pub fn range(&self, clock: &dyn Clock) -> Result<TimeRange> {
        let date = NaiveDate::parse_from_str(&self.date, QUERY_DATE_FORMAT)
            .map_err(|e| Error::timestamp(format!("Invalid date {:?}: {}", self.date, e)))?;
        let tz = self.timezone()?;

        let start = localise(tz, date.and_time(NaiveTime::MIN))?;
        let end = start + Duration::days(1);
        Ok(TimeRange::new(clock.to_local(start), clock.to_local(end)))
    }
}

/// Resolve a wall time in `tz`; a time skipped by a transition moves to the first valid one
fn localise(tz: Tz, local: NaiveDateTime) -> Result<chrono::DateTime<Utc>> {
    for shift in 0..=2 {
        let candidate = local + Duration::hours(shift);
        if let Some(at) = tz.from_local_datetime(&candidate).earliest() {
            return Ok(at.with_timezone(&Utc));
        }
    }
    Err(Error::timestamp(format!("{} does not exist in {}", local, tz.name())))
}

/// An entry as returned to query clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Epoch seconds, rounded
    pub ts: i64,
    /// Logger name
    pub name: String,
    /// First line of the message
    pub msg: String,
    /// Continuation lines, omitted from JSON when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
}

impl QueryRecord {
    /// Convert a stored entry, interpreting its timestamp through `clock`
    pub fn from_entry(entry: LogEntry, clock: &dyn Clock) -> Self {
        let millis = clock.to_utc(entry.timestamp).timestamp_millis();
        Self {
            ts: (millis + 500).div_euclid(1000),
            name: entry.logger_name,
            msg: entry.message,
            detail: entry.detail,
        }
    }
}

/// Admission rules applied by the routing layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    token: Option<String>,
    enabled: Vec<Level>,
}

impl AccessPolicy {
    /// Create a policy; `None` disables the token check
    pub fn new(token: Option<String>, enabled: impl IntoIterator<Item = Level>) -> Self {
        Self {
            token,
            enabled: enabled.into_iter().collect(),
        }
    }

    /// Policy described by a store configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.auth_token.clone(), config.enabled_levels.iter().copied())
    }

    /// Check a presented authorization header
    pub fn authorize(&self, header: Option<&str>) -> bool {
        match &self.token {
            None => true,
            Some(token) => header.map(str::as_bytes) == Some(token.as_bytes()),
        }
    }

    /// Whether records of `level` are forwarded to the store
    pub fn accepts(&self, level: Level) -> bool {
        self.enabled.contains(&level)
    }

    /// Display strings of the enabled levels, most severe first
    pub fn enabled_level_names(&self) -> Vec<&'static str> {
        Level::all()
            .into_iter()
            .filter(|level| self.accepts(*level))
            .map(|level| level.tag())
            .collect()
    }
}

//! Log entries and their line format
//!
//! A record is persisted as a header line followed by raw detail lines:
//!
//! ```text
//! [2024-05-15 10:00:00.200] ERROR:billing.worker:88 charge failed
//! Traceback (most recent call last):
//!   File "worker.py", line 88, in charge
//! ```
//!
//! Only header lines start with `[`. Detail lines are stored verbatim.

use std::fmt::Write as FmtWrite;
use chrono::{NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::level::Level;

/// Timestamp layout inside the header brackets
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Layout accepted when reading headers back
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Token written in place of a missing origin line
const NO_ORIGIN: &str = "-";

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall time, millisecond precision
    pub timestamp: NaiveDateTime,
    /// Severity level
    pub level: Level,
    /// Name of the component that emitted the record
    pub logger_name: String,
    /// Source line of the emitting call, if known
    pub origin_line: Option<u32>,
    /// Primary single-line message
    pub message: String,
    /// Additional raw lines, e.g. a stack trace
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
}

impl LogEntry {
    /// Create a new entry; the timestamp is truncated to milliseconds
    pub fn new(
        timestamp: NaiveDateTime,
        level: Level,
        logger_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(3),
            level,
            logger_name: logger_name.into(),
            origin_line: None,
            message: message.into(),
            detail: Vec::new(),
        }
    }

    /// Set the origin line
    pub fn with_origin_line(mut self, line: u32) -> Self {
        self.origin_line = Some(line);
        self
    }

    /// Set the detail lines
    pub fn with_detail<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detail = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Render the header line, without terminator
    pub fn header_line(&self) -> String {
        let mut line = String::with_capacity(48 + self.logger_name.len() + self.message.len());
        let _ = write!(
            line,
            "[{}] {}:{}:",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level.tag(),
            self.logger_name
        );
        match self.origin_line {
            Some(origin) => {
                let _ = write!(line, "{}", origin);
            }
            None => line.push_str(NO_ORIGIN),
        }
        line.push(' ');
        line.push_str(&self.message);
        line
    }

    /// Serialize the whole record, each line `\n`-terminated
    pub fn to_record(&self) -> String {
        let mut record = self.header_line();
        record.push('\n');
        for line in &self.detail {
            record.push_str(line);
            record.push('\n');
        }
        record
    }

    /// Length of the serialized record in bytes
    pub fn record_len(&self) -> usize {
        self.to_record().len()
    }
}

/// Fields recovered from a header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Parsed timestamp
    pub timestamp: NaiveDateTime,
    /// Level from the tag, if the tag carries a known one
    pub level: Option<Level>,
    /// Logger name
    pub logger_name: String,
    /// Origin line
    pub origin_line: Option<u32>,
    /// Remainder of the line
    pub message: String,
}

impl Header {
    /// Build an entry from this header; `level` fills in an unknown tag
    pub fn into_entry(self, level: Level) -> LogEntry {
        LogEntry {
            timestamp: self.timestamp,
            level: self.level.unwrap_or(level),
            logger_name: self.logger_name,
            origin_line: self.origin_line,
            message: self.message,
            detail: Vec::new(),
        }
    }
}

/// Check whether a line opens a new record
pub fn is_header(line: &str) -> bool {
    line.starts_with('[')
}

/// Format a timestamp the way headers carry it
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a header timestamp
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE_FORMAT).ok()
}

/// Parse a header line (without its terminator)
///
/// Returns a description of the problem when the line is not a valid header.
pub fn parse_header(line: &str) -> std::result::Result<Header, String> {
    let body = line
        .strip_prefix('[')
        .ok_or_else(|| "header does not start with '['".to_string())?;
    let (stamp, rest) = body
        .split_once(']')
        .ok_or_else(|| "unterminated timestamp bracket".to_string())?;
    let timestamp = parse_timestamp(stamp).ok_or_else(|| format!("invalid timestamp {:?}", stamp))?;

    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let (tag, message) = match rest.split_once(' ') {
        Some((tag, message)) => (tag, message),
        None => (rest, ""),
    };

    let (level, logger_name, origin_line) = parse_tag(tag);

    Ok(Header {
        timestamp,
        level,
        logger_name,
        origin_line,
        message: message.to_string(),
    })
}

/// Split `LEVEL:logger:origin`; logger names may contain ':'
fn parse_tag(tag: &str) -> (Option<Level>, String, Option<u32>) {
    let (level_part, rest) = match tag.split_once(':') {
        Some((level, rest)) => (level, rest),
        None => return (None, tag.to_string(), None),
    };

    let level = level_part.parse::<Level>().ok();
    if level.is_none() {
        // Not a level prefix, keep the whole tag as the name
        return (None, tag.to_string(), None);
    }

    match rest.rsplit_once(':') {
        Some((name, origin)) if origin == NO_ORIGIN || origin == "None" => (level, name.to_string(), None),
        Some((name, origin)) => match origin.parse::<u32>() {
            Ok(line) => (level, name.to_string(), Some(line)),
            Err(_) => (level, rest.to_string(), None),
        },
        None => (level, rest.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    fn ts(ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap().and_hms_milli_opt(10, 0, 0, ms).unwrap()
    }

    #[test]
    fn test_header_format() {
        let entry = LogEntry::new(ts(100), Level::Error, "billing", "charge failed").with_origin_line(88);
        assert_eq!(entry.header_line(), "[2024-05-15 10:00:00.100] ERROR:billing:88 charge failed");

        let entry = LogEntry::new(ts(5), Level::Warning, "api", "slow");
        assert_eq!(entry.header_line(), "[2024-05-15 10:00:00.005] WARN:api:- slow");
    }

    #[test]
    fn test_timestamp_truncated_to_millis() {
        let precise = ts(100).with_nanosecond(100_987_654).unwrap();
        let entry = LogEntry::new(precise, Level::Info, "x", "y");
        assert_eq!(entry.timestamp, ts(100));
    }

    #[test]
    fn test_record_with_detail() {
        let entry = LogEntry::new(ts(200), Level::Error, "svc", "boom").with_detail(["line1", "  line2 "]);
        assert_eq!(
            entry.to_record(),
            "[2024-05-15 10:00:00.200] ERROR:svc:- boom\nline1\n  line2 \n"
        );
        assert_eq!(entry.record_len(), entry.to_record().len());
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header("[2024-05-15 10:00:00.100] ERROR:billing:88 charge  failed twice").unwrap();
        assert_eq!(header.timestamp, ts(100));
        assert_eq!(header.level, Some(Level::Error));
        assert_eq!(header.logger_name, "billing");
        assert_eq!(header.origin_line, Some(88));
        assert_eq!(header.message, "charge  failed twice");
    }

    #[test]
    fn test_parse_header_tag_variants() {
        let header = parse_header("[2024-05-15 10:00:00.100] INFO:pkg:mod:None hello").unwrap();
        assert_eq!(header.logger_name, "pkg:mod");
        assert_eq!(header.origin_line, None);

        let header = parse_header("[2024-05-15 10:00:00.100] WARN:pkg:mod plain").unwrap();
        assert_eq!(header.logger_name, "pkg:mod");

        let header = parse_header("[2024-05-15 10:00:00.100] MAIN started").unwrap();
        assert_eq!(header.level, None);
        assert_eq!(header.logger_name, "MAIN");
        assert_eq!(header.message, "started");

        let header = parse_header("[2024-05-15 10:00:00.100] DEBUG:worker").unwrap();
        assert_eq!(header.logger_name, "worker");
        assert_eq!(header.message, "");
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        assert!(parse_header("[not a time] ERROR:x:1 y").is_err());
        assert!(parse_header("[2024-05-15 10:00:00.100 ERROR:x:1 y").is_err());
        assert!(parse_header("plain line").is_err());
    }

    #[test]
    fn test_header_round_trip() {
        let entry = LogEntry::new(ts(999), Level::Debug, "a:b", "msg with  spaces").with_origin_line(3);
        let header = parse_header(&entry.header_line()).unwrap();
        assert_eq!(header.into_entry(Level::Debug), entry);
    }
}

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::bucket::{buckets_covering, resolve_path, BucketWidth};
use crate::config::MalformedLinePolicy;
use crate::entry::{is_header, parse_header, LogEntry};
use crate::error::{Error, Result};
use crate::level::Level;
use crate::metrics::MetricsCollector;

/// Half-open range of local wall time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start time (inclusive)
    pub start: NaiveDateTime,
    /// End time (exclusive)
    pub end: NaiveDateTime,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Create a range spanning one calendar day
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// Create a range of `duration` starting at `start`
    pub fn starting_at(start: NaiveDateTime, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    /// Check the range is well formed
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::query(format!(
                "Range start {} is after its end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Check if the range covers no time at all
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if a timestamp is inside the range
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// Reads bucket files back into entries
#[derive(Debug)]
pub struct QueryEngine {
    dir: PathBuf,
    width: BucketWidth,
    policy: MalformedLinePolicy,
    parallel: bool,
    metrics: Arc<MetricsCollector>,
}

impl QueryEngine {
    /// Create a query engine over `dir`
    pub fn new(
        dir: impl Into<PathBuf>,
        width: BucketWidth,
        policy: MalformedLinePolicy,
        parallel: bool,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            dir: dir.into(),
            width,
            policy,
            parallel,
            metrics,
        }
    }

    /// Bucket files that may hold entries of `level` inside `range`, in bucket order
    ///
    /// Covered buckets without a file are left out.
    pub fn candidate_files(&self, level: Level, range: &TimeRange) -> Vec<PathBuf> {
        if range.is_empty() {
            return Vec::new();
        }

        buckets_covering(range.start, range.end, self.width)
            .map(|start| resolve_path(&self.dir, level, start, self.width))
            .filter(|path| {
                let exists = path.is_file();
                if !exists {
                    self.metrics.increment_files_missing();
                }
                exists
            })
            .collect()
    }

    /// Every entry of `level` with a timestamp in `range`, oldest bucket first
    pub fn query(&self, level: Level, range: &TimeRange) -> Result<Vec<LogEntry>> {
        range.validate()?;
        let start = Instant::now();

        let files = self.candidate_files(level, range);

        // Collecting a parallel iterator keeps the input order
        let per_file: Vec<Result<Vec<LogEntry>>> = if self.parallel && files.len() > 1 {
            files
                .par_iter()
                .map(|path| self.scan_file(path, level, range))
                .collect()
        } else {
            files
                .iter()
                .map(|path| self.scan_file(path, level, range))
                .collect()
        };

        let mut results = Vec::new();
        for entries in per_file {
            results.extend(entries?);
        }

        debug!(
            level = %level,
            start = %range.start,
            end = %range.end,
            files = files.len(),
            results = results.len(),
            "query finished"
        );
        self.metrics.record_query(results.len(), start.elapsed());

        Ok(results)
    }

    /// Parse one bucket file; a file removed since enumeration yields nothing
    fn scan_file(&self, path: &Path, level: Level, range: &TimeRange) -> Result<Vec<LogEntry>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.metrics.increment_files_missing();
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        self.metrics.increment_files_scanned();

        let mut parser = FileParser::new(level, *range, self.policy, path);
        parser.parse(BufReader::new(file))?;

        for _ in 0..parser.malformed() {
            self.metrics.increment_malformed_lines();
        }

        Ok(parser.into_entries())
    }
}

/// Scan state of [`FileParser`]
#[derive(Debug)]
enum ScanState {
    /// Not inside any record, or inside one outside the range
    Discarding,
    /// Inside a record that will be returned
    Collecting(LogEntry),
}

/// Line-by-line parser for one bucket file
///
/// Within a file timestamps never decrease, so the first header at or past
/// the end of the range stops the scan.
#[derive(Debug)]
pub struct FileParser<'a> {
    level: Level,
    range: TimeRange,
    policy: MalformedLinePolicy,
    path: &'a Path,
    state: ScanState,
    entries: Vec<LogEntry>,
    malformed: usize,
}

impl<'a> FileParser<'a> {
    /// Create a parser for entries of `level` inside `range`
    pub fn new(level: Level, range: TimeRange, policy: MalformedLinePolicy, path: &'a Path) -> Self {
        Self {
            level,
            range,
            policy,
            path,
            state: ScanState::Discarding,
            entries: Vec::new(),
            malformed: 0,
        }
    }

    /// Feed a whole reader through the parser
    pub fn parse<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::with_capacity(256);
        let mut line_no = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;

            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf);

            if !self.feed(&line, line_no)? {
                break;
            }
        }

        self.finish();
        Ok(())
    }

    /// Process one line without its terminator
    ///
    /// Returns `false` once the rest of the file can be skipped.
    pub fn feed(&mut self, line: &str, line_no: usize) -> Result<bool> {
        if !is_header(line) {
            if let ScanState::Collecting(entry) = &mut self.state {
                entry.detail.push(line.to_string());
            }
            return Ok(true);
        }

        self.finish();

        let header = match parse_header(line) {
            Ok(header) => header,
            Err(message) => match self.policy {
                MalformedLinePolicy::Strict => return Err(Error::parse(self.path, line_no, message)),
                MalformedLinePolicy::Skip => {
                    warn!(path = %self.path.display(), line = line_no, %message, "skipping malformed record");
                    self.malformed += 1;
                    return Ok(true);
                }
            },
        };

        if header.timestamp >= self.range.end {
            return Ok(false);
        }

        if header.timestamp >= self.range.start {
            self.state = ScanState::Collecting(header.into_entry(self.level));
        }

        Ok(true)
    }

    /// Finalize the record in progress, if it qualifies
    pub fn finish(&mut self) {
        if let ScanState::Collecting(entry) = std::mem::replace(&mut self.state, ScanState::Discarding) {
            self.entries.push(entry);
        }
    }

    /// Number of malformed headers skipped so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Entries collected so far
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 15)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn parse(text: &str, range: TimeRange, policy: MalformedLinePolicy) -> Result<(Vec<LogEntry>, usize)> {
        let path = Path::new("/logs/error_2024-05-15.log");
        let mut parser = FileParser::new(Level::Error, range, policy, path);
        parser.parse(text.as_bytes())?;
        let malformed = parser.malformed();
        Ok((parser.into_entries(), malformed))
    }

    const FILE: &str = "\
[2024-05-15 08:59:59.999] ERROR:early:1 too early
stale detail
[2024-05-15 09:00:00.000] ERROR:svc:2 first
[2024-05-15 10:00:00.200] ERROR:svc:3 second
line1
line2
[2024-05-15 11:00:00.000] ERROR:svc:4 at end
tail detail
[2024-05-15 12:00:00.000] ERROR:svc:5 after end
";

    #[test]
    fn test_range_filtering() -> Result<()> {
        let range = TimeRange::new(at(9, 0, 0, 0), at(11, 0, 0, 0));
        let (entries, malformed) = parse(FILE, range, MalformedLinePolicy::Skip)?;

        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert!(entries[0].detail.is_empty());
        assert_eq!(entries[1].detail, vec!["line1", "line2"]);
        assert_eq!(entries[1].origin_line, Some(3));
        assert_eq!(malformed, 0);
        Ok(())
    }

    #[test]
    fn test_detail_of_last_entry_kept() -> Result<()> {
        let range = TimeRange::new(at(10, 30, 0, 0), at(23, 0, 0, 0));
        let (entries, _) = parse(FILE, range, MalformedLinePolicy::Skip)?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detail, vec!["tail detail"]);
        assert_eq!(entries[1].message, "after end");
        Ok(())
    }

    #[test]
    fn test_partial_final_line() -> Result<()> {
        let text = "[2024-05-15 10:00:00.000] ERROR:svc:1 complete\n[2024-05-15 10:00:01.000] ERROR:svc:2 half writ";
        let (entries, _) = parse(text, TimeRange::day(at(0, 0, 0, 0).date()), MalformedLinePolicy::Skip)?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "half writ");
        Ok(())
    }

    #[test]
    fn test_detail_preserved_verbatim() -> Result<()> {
        let text = "[2024-05-15 10:00:00.000] ERROR:svc:1 boom\n  indented\t\ntrailing spaces   \n\n";
        let (entries, _) = parse(text, TimeRange::day(at(0, 0, 0, 0).date()), MalformedLinePolicy::Skip)?;

        assert_eq!(entries[0].detail, vec!["  indented\t", "trailing spaces   ", ""]);
        Ok(())
    }

    #[test]
    fn test_skip_malformed_record() -> Result<()> {
        let text = "\
[2024-05-15 10:00:00.000] ERROR:svc:1 good
[garbage] ERROR:svc:2 broken
detail of broken
[2024-05-15 10:00:02.000] ERROR:svc:3 also good
";
        let (entries, malformed) = parse(text, TimeRange::day(at(0, 0, 0, 0).date()), MalformedLinePolicy::Skip)?;

        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["good", "also good"]);
        assert!(entries[0].detail.is_empty());
        assert_eq!(malformed, 1);
        Ok(())
    }

    #[test]
    fn test_strict_malformed_record() {
        let text = "[2024-05-15 10:00:00.000] ERROR:svc:1 good\n[garbage] ERROR:svc:2 broken\n";
        let err = parse(text, TimeRange::day(at(0, 0, 0, 0).date()), MalformedLinePolicy::Strict).unwrap_err();

        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_leading_unframed_lines_dropped() -> Result<()> {
        let text = "orphan\n[2024-05-15 10:00:00.000] ERROR:svc:1 msg\n";
        let (entries, _) = parse(text, TimeRange::day(at(0, 0, 0, 0).date()), MalformedLinePolicy::Skip)?;

        assert_eq!(entries.len(), 1);
        assert!(entries[0].detail.is_empty());
        Ok(())
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(at(9, 0, 0, 0), at(10, 0, 0, 0));
        assert!(range.contains(at(9, 0, 0, 0)));
        assert!(!range.contains(at(10, 0, 0, 0)));
        assert!(range.validate().is_ok());

        let backwards = TimeRange::new(at(10, 0, 0, 0), at(9, 0, 0, 0));
        assert!(backwards.validate().unwrap_err().is_query_error());

        let day = TimeRange::day(at(0, 0, 0, 0).date());
        assert_eq!(day.end - day.start, Duration::days(1));
        assert_eq!(TimeRange::starting_at(at(9, 0, 0, 0), Duration::hours(1)), range);
    }
}

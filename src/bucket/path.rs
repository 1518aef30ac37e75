//! Bucket file naming
//!
//! Maps `(level, bucket start)` to a file inside the log directory and back.
//! The names are part of the durable format: files written by an earlier
//! instance must resolve to the same paths.

use std::fs;
use std::path::{Path, PathBuf};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::bucket::{Bucket, BucketWidth};
use crate::error::Result;
use crate::level::Level;

/// Date part of a bucket file name
pub const FILE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Extension of bucket files
pub const FILE_EXTENSION: &str = "log";

/// Get the file name for a bucket
pub fn file_name(level: Level, start: NaiveDateTime, width: BucketWidth) -> String {
    if width.is_daily() {
        format!(
            "{}_{}.{}",
            level.file_prefix(),
            start.format(FILE_DATE_FORMAT),
            FILE_EXTENSION
        )
    } else {
        format!(
            "{}_{}_{}.{}",
            level.file_prefix(),
            start.format(FILE_DATE_FORMAT),
            start.format("%H"),
            FILE_EXTENSION
        )
    }
}

/// Get the path for a bucket file
pub fn resolve_path(dir: &Path, level: Level, start: NaiveDateTime, width: BucketWidth) -> PathBuf {
    dir.join(file_name(level, start, width))
}

/// Recover the bucket a file name refers to
///
/// Returns `None` for names that do not follow the naming scheme of `width`.
pub fn parse_file_name(name: &str, width: BucketWidth) -> Option<Bucket> {
    let stem = name.strip_suffix(".log")?;
    let (prefix, rest) = stem.split_once('_')?;
    let level = Level::from_file_prefix(prefix)?;

    let start = if width.is_daily() {
        let date = NaiveDate::parse_from_str(rest, FILE_DATE_FORMAT).ok()?;
        date.and_time(NaiveTime::MIN)
    } else {
        let (date, hour) = rest.split_once('_')?;
        if hour.len() != 2 {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, FILE_DATE_FORMAT).ok()?;
        let hour = hour.parse::<u32>().ok()?;
        date.and_hms_opt(hour, 0, 0)?
    };

    Some(Bucket::new(level, start))
}

/// List existing bucket files of a level, oldest first
pub fn list_buckets(dir: &Path, level: Level, width: BucketWidth) -> Result<Vec<(Bucket, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut result = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        if let Some(bucket) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| parse_file_name(name, width))
        {
            if bucket.level == level {
                result.push((bucket, path));
            }
        }
    }

    result.sort_by(|a, b| a.0.start.cmp(&b.0.start));

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn start(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(Level::Error, start(15, 0), BucketWidth::DAILY), "error_2024-05-15.log");
        assert_eq!(file_name(Level::Warning, start(15, 9), BucketWidth::HOURLY), "warn_2024-05-15_09.log");

        let path = resolve_path(Path::new("/data/logs"), Level::Info, start(1, 0), BucketWidth::DAILY);
        assert_eq!(path, Path::new("/data/logs/info_2024-05-01.log"));
    }

    #[test]
    fn test_parse_file_name() {
        let bucket = parse_file_name("debug_2024-05-15_13.log", BucketWidth::HOURLY).unwrap();
        assert_eq!(bucket, Bucket::new(Level::Debug, start(15, 13)));

        let bucket = parse_file_name("error_2024-05-15.log", BucketWidth::DAILY).unwrap();
        assert_eq!(bucket, Bucket::new(Level::Error, start(15, 0)));

        assert!(parse_file_name("error_2024-05-15.log", BucketWidth::HOURLY).is_none());
        assert!(parse_file_name("trace_2024-05-15.log", BucketWidth::DAILY).is_none());
        assert!(parse_file_name("error_2024-05-15.txt", BucketWidth::DAILY).is_none());
    }

    #[test]
    fn test_list_buckets() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();

        File::create(dir.join("info_2024-05-16.log"))?;
        File::create(dir.join("info_2024-05-14.log"))?;
        File::create(dir.join("error_2024-05-15.log"))?;
        File::create(dir.join("notes.txt"))?;

        let buckets = list_buckets(dir, Level::Info, BucketWidth::DAILY)?;
        let starts: Vec<_> = buckets.iter().map(|(b, _)| b.start).collect();
        assert_eq!(starts, vec![start(14, 0), start(16, 0)]);

        assert!(list_buckets(&dir.join("missing"), Level::Info, BucketWidth::DAILY)?.is_empty());

        Ok(())
    }
}

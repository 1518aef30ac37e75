//! Severity levels
//!
//! The closed set of severities the store shards by. Every boundary that
//! touches a level (file naming, persisted tags, ingestion) matches on this
//! enum rather than on raw strings.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of distinct severity levels
pub const LEVEL_COUNT: usize = 4;

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    /// Failures that need attention
    #[serde(rename = "ERROR")]
    Error,
    /// Unexpected but recoverable conditions
    #[serde(rename = "WARN", alias = "WARNING")]
    Warning,
    /// Normal operational messages
    #[serde(rename = "INFO")]
    Info,
    /// Verbose diagnostics
    #[serde(rename = "DEBUG")]
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Self::Error),
            "WARN" | "WARNING" => Ok(Self::Warning),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(Error::level(s)),
        }
    }
}

impl Level {
    /// Tag written into record lines and shown to clients
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    /// Prefix used for this level's bucket file names
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Resolve a numeric level as emitted by Python-style logging clients
    pub fn from_levelno(levelno: u32) -> Result<Self> {
        match levelno {
            40 => Ok(Self::Error),
            30 => Ok(Self::Warning),
            20 => Ok(Self::Info),
            10 => Ok(Self::Debug),
            other => Err(Error::level(other.to_string())),
        }
    }

    /// Numeric level matching `from_levelno`
    pub fn levelno(&self) -> u32 {
        match self {
            Self::Error => 40,
            Self::Warning => 30,
            Self::Info => 20,
            Self::Debug => 10,
        }
    }

    /// Stable slot index, `0..LEVEL_COUNT`
    pub fn index(&self) -> usize {
        match self {
            Self::Error => 0,
            Self::Warning => 1,
            Self::Info => 2,
            Self::Debug => 3,
        }
    }

    /// Find the level owning a file prefix
    pub fn from_file_prefix(prefix: &str) -> Option<Self> {
        Self::all().into_iter().find(|level| level.file_prefix() == prefix)
    }

    /// Get all levels, most severe first
    pub fn all() -> [Self; LEVEL_COUNT] {
        [Self::Error, Self::Warning, Self::Info, Self::Debug]
    }
}

//! Error handling for logstrata
//!
//! This module provides error types and result aliases for store operations.

use std::io;
use std::path::PathBuf;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to the log directory or the store lifecycle
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be appended, even after retrying
    #[error("Write to {path:?} failed after {attempts} attempt(s): {source}")]
    Write {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// An entry is older than the last record already in its bucket file
    #[error("Entry at {timestamp} is older than the last record ({last}) in {path:?}")]
    OutOfOrder {
        path: PathBuf,
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },

    /// A persisted line could not be parsed back into an entry
    #[error("Parse error in {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Errors related to query parameters
    #[error("Query error: {0}")]
    Query(String),

    /// Unknown severity level
    #[error("Unknown log level: {0}")]
    Level(String),

    /// Errors related to timestamp or timezone handling
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    /// Errors related to serialization/deserialization of boundary payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new write error
    pub fn write(path: impl Into<PathBuf>, attempts: u32, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            attempts,
            source,
        }
    }

    /// Create a new out-of-order error
    pub fn out_of_order(path: impl Into<PathBuf>, timestamp: NaiveDateTime, last: NaiveDateTime) -> Self {
        Self::OutOfOrder {
            path: path.into(),
            timestamp,
            last,
        }
    }

    /// Create a new parse error
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a new query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a new level error
    pub fn level(name: impl Into<String>) -> Self {
        Self::Level(name.into())
    }

    /// Create a new timestamp error
    pub fn timestamp(message: impl Into<String>) -> Self {
        Self::Timestamp(message.into())
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is an exhausted write
    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Check if this is a rejected out-of-order write
    pub fn is_out_of_order_error(&self) -> bool {
        matches!(self, Self::OutOfOrder { .. })
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Check if this is a query error
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Storage(_) => Some("Check if the log directory exists and is writable".to_string()),
            Self::Io(err) if err.kind() == io::ErrorKind::NotFound => {
                Some("The specified file or directory does not exist".to_string())
            }
            Self::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("You don't have permission to access this file or directory".to_string())
            }
            Self::Write { .. } => Some("Check available disk space and the log directory permissions".to_string()),
            Self::OutOfOrder { .. } => Some("Append entries of a level in timestamp order, or stamp them at write time with LogStore::log".to_string()),
            Self::Parse { .. } => Some("The log file contains a corrupt record; switch to the skip policy to read past it".to_string()),
            Self::Config(_) => Some("Review the store configuration values".to_string()),
            _ => None,
        }
    }
}

//! logstrata - bucketed, line-oriented log storage
//!
//! Records are sharded by severity level and fixed-width time window into
//! plain text files, one file per `(level, bucket)`:
//!
//! ```text
//! _logs/
//!   error_2024-05-15.log
//!   warn_2024-05-15.log
//!   info_2024-05-15_09.log   (sub-daily buckets carry the hour)
//! ```
//!
//! # Components
//!
//! - [`bucket`]: clock abstraction, bucket arithmetic and file naming
//! - [`HandleManager`]: at most one open file per level
//! - [`RecordWriter`]: append path with a bounded retry
//! - [`QueryEngine`]: range scans over bucket files
//! - [`LogStore`]: the facade tying them together
//! - [`boundary`]: payloads exchanged with an HTTP routing layer
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logstrata::{Level, LogStore, StoreConfig, SystemClock};
//!
//! let store = LogStore::open(StoreConfig::new().with_directory("/var/log/app"), Arc::new(SystemClock))?;
//! store.log(Level::Error, "billing", Some(88), "charge failed", vec!["card declined".into()])?;
//!
//! let now = store.clock().now_local();
//! let recent = store.query(Level::Error, now - chrono::Duration::hours(1), now)?;
//! ```

pub mod boundary;
pub mod bucket;
pub mod config;
pub mod entry;
pub mod error;
pub mod handle;
pub mod level;
pub mod metrics;
pub mod query;
pub mod store;
pub mod writer;

pub use boundary::{AccessPolicy, Ack, IngestRecord, QueryRecord, QueryRequest};
pub use bucket::{Bucket, BucketWidth, Clock, FixedClock, SystemClock};
pub use config::{MalformedLinePolicy, StoreConfig};
pub use entry::LogEntry;
pub use error::{Error, Result};
pub use handle::{BucketFile, ConsoleOpener, FileOpener, FsOpener, HandleManager};
pub use level::Level;
pub use metrics::{MetricsCollector, StoreStats};
pub use query::{QueryEngine, TimeRange};
pub use store::LogStore;
pub use writer::{RecordWriter, RetryPolicy};

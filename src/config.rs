//! Configuration for logstrata
//!
//! This module provides configuration options for the log store.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::bucket::{BucketWidth, DAY_SECS};
use crate::error::{Error, Result};
use crate::level::Level;

/// Longest accepted pause before the write retry
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// How the query engine treats a header line it cannot parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum MalformedLinePolicy {
    /// Drop the broken record and keep scanning the file
    Skip,
    /// Fail the query with a parse error
    Strict,
}

impl Default for MalformedLinePolicy {
    fn default() -> Self {
        Self::Skip
    }
}

impl std::fmt::Display for MalformedLinePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl MalformedLinePolicy {
    /// Parse a policy from a string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "strict" => Ok(Self::Strict),
            _ => Err(Error::config(format!("Unknown malformed line policy: {}", s))),
        }
    }

    /// Get the name of the policy
    pub fn name(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Strict => "strict",
        }
    }
}

/// Configuration options for a log store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct StoreConfig {
    // Storage configuration
    /// Directory holding the bucket files
    pub directory: PathBuf,
    /// Width of a time bucket in seconds (minimum one hour)
    pub bucket_width_secs: u64,
    /// Print records to standard output instead of writing bucket files
    pub console_output: bool,

    // Reliability settings
    /// Whether to sync every append to disk, not just flush it
    pub sync_writes: bool,
    /// Pause before retrying a failed append, in milliseconds
    pub write_retry_backoff_ms: u64,
    /// Number of retries after a failed append (0 or 1)
    pub write_retries: u32,

    // Query settings
    /// Treatment of unparseable record headers
    pub malformed_line_policy: MalformedLinePolicy,
    /// Whether to parse bucket files in parallel
    pub parallel_query_execution: bool,

    // Ingestion policy
    /// Levels the ingestion boundary forwards to the store
    pub enabled_levels: Vec<Level>,
    /// Static token clients must present; `None` disables the check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    // Additional settings
    /// Enable metrics collection
    pub collect_metrics: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("_logs"),
            bucket_width_secs: DAY_SECS,
            console_output: false,

            sync_writes: false,
            write_retry_backoff_ms: 2_000,
            write_retries: 1,

            malformed_line_policy: MalformedLinePolicy::default(),
            parallel_query_execution: true,

            enabled_levels: Level::all().to_vec(),
            auth_token: None,

            collect_metrics: true,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log directory
    pub fn with_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.directory = path.as_ref().to_path_buf();
        self
    }

    /// Set the bucket width in seconds
    pub fn with_bucket_width_secs(mut self, secs: u64) -> Self {
        self.bucket_width_secs = secs;
        self
    }

    /// Set the bucket width
    pub fn with_bucket_width(mut self, width: BucketWidth) -> Self {
        self.bucket_width_secs = width.as_secs();
        self
    }

    /// Set whether records go to standard output instead of files
    pub fn with_console_output(mut self, console: bool) -> Self {
        self.console_output = console;
        self
    }

    /// Set whether to sync writes to disk immediately
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Set the pause before a write retry
    pub fn with_write_retry_backoff(mut self, backoff: Duration) -> Self {
        self.write_retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the number of write retries
    pub fn with_write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }

    /// Set the malformed line policy
    pub fn with_malformed_line_policy(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_line_policy = policy;
        self
    }

    /// Set whether to use parallel query execution
    pub fn with_parallel_query_execution(mut self, parallel: bool) -> Self {
        self.parallel_query_execution = parallel;
        self
    }

    /// Set the enabled levels
    pub fn with_enabled_levels(mut self, levels: impl IntoIterator<Item = Level>) -> Self {
        self.enabled_levels = levels.into_iter().collect();
        self
    }

    /// Set the auth token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set whether to collect metrics
    pub fn with_collect_metrics(mut self, collect: bool) -> Self {
        self.collect_metrics = collect;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::config("Log directory must not be empty"));
        }

        BucketWidth::from_secs(self.bucket_width_secs)?;

        if self.write_retries > 1 {
            return Err(Error::config("Write retries must be 0 or 1"));
        }

        if self.write_retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(Error::config(format!(
                "Write retry backoff must be at most {}ms",
                MAX_RETRY_BACKOFF_MS
            )));
        }

        if self.enabled_levels.is_empty() {
            return Err(Error::config("At least one log level must be enabled"));
        }

        Ok(())
    }

    /// Get the validated bucket width
    pub fn bucket_width(&self) -> Result<BucketWidth> {
        BucketWidth::from_secs(self.bucket_width_secs)
    }

    /// Get the write retry backoff as a Duration
    pub fn write_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.write_retry_backoff_ms)
    }

    /// Get the malformed line policy as a string
    pub fn malformed_line_policy_str(&self) -> &'static str {
        self.malformed_line_policy.name()
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== logstrata Configuration ===\n\n");

        result.push_str("Storage Configuration:\n");
        result.push_str(&format!("  Directory: {:?}\n", self.directory));
        match BucketWidth::from_secs(self.bucket_width_secs) {
            Ok(width) => result.push_str(&format!("  Bucket Width: {}\n", width)),
            Err(_) => result.push_str(&format!("  Bucket Width: {}s (invalid)\n", self.bucket_width_secs)),
        }
        result.push_str(&format!("  Console Output: {}\n", self.console_output));

        result.push_str("\nReliability Settings:\n");
        result.push_str(&format!("  Sync Writes: {}\n", self.sync_writes));
        result.push_str(&format!("  Write Retries: {}\n", self.write_retries));
        result.push_str(&format!("  Write Retry Backoff: {} ms\n", self.write_retry_backoff_ms));

        result.push_str("\nQuery Settings:\n");
        result.push_str(&format!("  Malformed Line Policy: {}\n", self.malformed_line_policy));
        result.push_str(&format!("  Parallel Query Execution: {}\n", self.parallel_query_execution));

        result.push_str("\nIngestion Policy:\n");
        let levels: Vec<&str> = self.enabled_levels.iter().map(|l| l.tag()).collect();
        result.push_str(&format!("  Enabled Levels: {}\n", levels.join(", ")));
        if self.auth_token.is_some() {
            result.push_str("  Authentication: Enabled\n");
        } else {
            result.push_str("  Authentication: Disabled\n");
        }

        result.push_str("\nAdditional Settings:\n");
        result.push_str(&format!("  Collect Metrics: {}\n", self.collect_metrics));

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();

        assert_eq!(config.directory, PathBuf::from("_logs"));
        assert_eq!(config.bucket_width_secs, 86_400);
        assert_eq!(config.sync_writes, false);
        assert_eq!(config.write_retry_backoff(), Duration::from_secs(2));
        assert_eq!(config.write_retries, 1);
        assert_eq!(config.malformed_line_policy, MalformedLinePolicy::Skip);
        assert_eq!(config.parallel_query_execution, true);
        assert_eq!(config.enabled_levels.len(), 4);
        assert!(config.auth_token.is_none());
        assert!(!config.console_output);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new()
            .with_directory("/var/log/strata")
            .with_bucket_width(BucketWidth::HOURLY)
            .with_sync_writes(true)
            .with_write_retry_backoff(Duration::from_millis(10))
            .with_malformed_line_policy(MalformedLinePolicy::Strict)
            .with_enabled_levels([Level::Error, Level::Warning])
            .with_auth_token("secret");

        assert_eq!(config.directory, PathBuf::from("/var/log/strata"));
        assert_eq!(config.bucket_width().unwrap(), BucketWidth::HOURLY);
        assert_eq!(config.write_retry_backoff_ms, 10);
        assert_eq!(config.malformed_line_policy_str(), "strict");
        assert_eq!(config.enabled_levels, vec![Level::Error, Level::Warning]);
        assert_eq!(config.auth_token.as_deref(), Some("secret"));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid_configs = vec![
            StoreConfig::new().with_bucket_width_secs(1800), // Under an hour
            StoreConfig::new().with_write_retries(2), // More than one retry
            StoreConfig::new().with_write_retry_backoff(Duration::from_secs(120)), // Too long
            StoreConfig::new().with_enabled_levels(Vec::new()), // Nothing enabled
            StoreConfig::new().with_directory(""), // No directory
        ];

        for config in invalid_configs {
            assert!(config.validate().unwrap_err().is_config_error());
        }
    }

    #[test]
    fn test_malformed_line_policy() {
        assert_eq!(MalformedLinePolicy::from_str("skip").unwrap(), MalformedLinePolicy::Skip);
        assert_eq!(MalformedLinePolicy::from_str("STRICT").unwrap(), MalformedLinePolicy::Strict);
        assert!(MalformedLinePolicy::from_str("ignore").is_err());
        assert_eq!(MalformedLinePolicy::Strict.to_string(), "strict");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"directory": "/tmp/x", "bucket_width_secs": 3600, "enabled_levels": ["ERROR", "WARNING"]}"#,
        )
        .unwrap();

        assert_eq!(config.bucket_width_secs, 3600);
        assert_eq!(config.enabled_levels, vec![Level::Error, Level::Warning]);
        assert_eq!(config.write_retries, 1);
    }

    #[test]
    fn test_config_pretty_string() {
        let pretty = StoreConfig::new().with_auth_token("hunter2").to_string_pretty();

        assert!(pretty.contains("Storage Configuration:"));
        assert!(pretty.contains("Bucket Width: 1d"));
        assert!(pretty.contains("Console Output: false"));
        assert!(pretty.contains("Enabled Levels: ERROR, WARN, INFO, DEBUG"));
        assert!(pretty.contains("Authentication: Enabled"));
        assert!(!pretty.contains("hunter2"));
    }
}

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Operation counters for a log store
#[derive(Debug)]
pub struct MetricsCollector {
    /// Whether recording is enabled
    enabled: AtomicBool,

    // Write path
    /// Number of records appended
    write_count: AtomicUsize,
    /// Total bytes appended
    bytes_written: AtomicUsize,
    /// Number of appends that needed the retry
    write_retries: AtomicUsize,
    /// Number of writes that failed after retrying
    write_failures: AtomicUsize,
    /// Total write duration in nanoseconds
    write_duration_ns: AtomicU64,

    // Handle lifecycle
    /// Number of bucket files opened
    handles_opened: AtomicUsize,
    /// Number of bucket transitions that closed an open handle
    rotations: AtomicUsize,

    // Read path
    /// Number of queries executed
    query_count: AtomicUsize,
    /// Number of bucket files read
    files_scanned: AtomicUsize,
    /// Number of covered buckets with no file
    files_missing: AtomicUsize,
    /// Total number of entries returned by queries
    entries_returned: AtomicUsize,
    /// Number of unparseable record headers encountered
    malformed_lines: AtomicUsize,
    /// Total query duration in nanoseconds
    query_duration_ns: AtomicU64,

    /// Start time of the metrics collector
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),

            write_count: AtomicUsize::new(0),
            bytes_written: AtomicUsize::new(0),
            write_retries: AtomicUsize::new(0),
            write_failures: AtomicUsize::new(0),
            write_duration_ns: AtomicU64::new(0),

            handles_opened: AtomicUsize::new(0),
            rotations: AtomicUsize::new(0),

            query_count: AtomicUsize::new(0),
            files_scanned: AtomicUsize::new(0),
            files_missing: AtomicUsize::new(0),
            entries_returned: AtomicUsize::new(0),
            malformed_lines: AtomicUsize::new(0),
            query_duration_ns: AtomicU64::new(0),

            start_time: Instant::now(),
        }
    }

    /// Create a collector that ignores every recording call
    pub fn disabled() -> Self {
        let metrics = Self::new();
        metrics.enabled.store(false, Ordering::Relaxed);
        metrics
    }

    /// Whether recording is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn add(&self, counter: &AtomicUsize, n: usize) {
        if self.is_enabled() {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    fn add_duration(&self, counter: &AtomicU64, duration: Duration) {
        if self.is_enabled() {
            counter.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        }
    }

    // Recording

    /// Record a successful append
    pub fn record_write(&self, bytes: usize, duration: Duration) {
        self.add(&self.write_count, 1);
        self.add(&self.bytes_written, bytes);
        self.add_duration(&self.write_duration_ns, duration);
    }

    /// Increment the write retry count
    pub fn increment_write_retries(&self) {
        self.add(&self.write_retries, 1);
    }

    /// Increment the failed write count
    pub fn increment_write_failures(&self) {
        self.add(&self.write_failures, 1);
    }

    /// Increment the opened handle count
    pub fn increment_handles_opened(&self) {
        self.add(&self.handles_opened, 1);
    }

    /// Increment the rotation count
    pub fn increment_rotations(&self) {
        self.add(&self.rotations, 1);
    }

    /// Record a finished query
    pub fn record_query(&self, results: usize, duration: Duration) {
        self.add(&self.query_count, 1);
        self.add(&self.entries_returned, results);
        self.add_duration(&self.query_duration_ns, duration);
    }

    /// Increment the scanned file count
    pub fn increment_files_scanned(&self) {
        self.add(&self.files_scanned, 1);
    }

    /// Increment the missing file count
    pub fn increment_files_missing(&self) {
        self.add(&self.files_missing, 1);
    }

    /// Increment the malformed line count
    pub fn increment_malformed_lines(&self) {
        self.add(&self.malformed_lines, 1);
    }

    // Getters

    /// Get the write count
    pub fn get_write_count(&self) -> usize {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Get the bytes written
    pub fn get_bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Get the write retry count
    pub fn get_write_retries(&self) -> usize {
        self.write_retries.load(Ordering::Relaxed)
    }

    /// Get the failed write count
    pub fn get_write_failures(&self) -> usize {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Get the opened handle count
    pub fn get_handles_opened(&self) -> usize {
        self.handles_opened.load(Ordering::Relaxed)
    }

    /// Get the rotation count
    pub fn get_rotations(&self) -> usize {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Get the query count
    pub fn get_query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Get the scanned file count
    pub fn get_files_scanned(&self) -> usize {
        self.files_scanned.load(Ordering::Relaxed)
    }

    /// Get the missing file count
    pub fn get_files_missing(&self) -> usize {
        self.files_missing.load(Ordering::Relaxed)
    }

    /// Get the returned entry count
    pub fn get_entries_returned(&self) -> usize {
        self.entries_returned.load(Ordering::Relaxed)
    }

    /// Get the malformed line count
    pub fn get_malformed_lines(&self) -> usize {
        self.malformed_lines.load(Ordering::Relaxed)
    }

    /// Get the average write latency
    pub fn get_avg_write_latency(&self) -> Duration {
        average(&self.write_duration_ns, self.get_write_count())
    }

    /// Get the average query latency
    pub fn get_avg_query_latency(&self) -> Duration {
        average(&self.query_duration_ns, self.get_query_count())
    }

    /// Get the uptime of the collector
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of every counter
    pub fn snapshot(&self) -> StoreStats {
        StoreStats {
            writes: self.get_write_count(),
            bytes_written: self.get_bytes_written(),
            write_retries: self.get_write_retries(),
            write_failures: self.get_write_failures(),
            handles_opened: self.get_handles_opened(),
            rotations: self.get_rotations(),
            queries: self.get_query_count(),
            files_scanned: self.get_files_scanned(),
            files_missing: self.get_files_missing(),
            entries_returned: self.get_entries_returned(),
            malformed_lines: self.get_malformed_lines(),
            avg_write_latency: self.get_avg_write_latency(),
            avg_query_latency: self.get_avg_query_latency(),
            uptime: self.uptime(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.write_count,
            &self.bytes_written,
            &self.write_retries,
            &self.write_failures,
            &self.handles_opened,
            &self.rotations,
            &self.query_count,
            &self.files_scanned,
            &self.files_missing,
            &self.entries_returned,
            &self.malformed_lines,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.write_duration_ns.store(0, Ordering::Relaxed);
        self.query_duration_ns.store(0, Ordering::Relaxed);
    }
}

fn average(total_ns: &AtomicU64, count: usize) -> Duration {
    if count == 0 {
        return Duration::from_nanos(0);
    }
    Duration::from_nanos(total_ns.load(Ordering::Relaxed) / count as u64)
}

/// Point-in-time copy of the store's counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records appended
    pub writes: usize,
    /// Bytes appended
    pub bytes_written: usize,
    /// Appends that needed the retry
    pub write_retries: usize,
    /// Writes that failed after retrying
    pub write_failures: usize,
    /// Bucket files opened
    pub handles_opened: usize,
    /// Handle rotations
    pub rotations: usize,
    /// Queries executed
    pub queries: usize,
    /// Bucket files read
    pub files_scanned: usize,
    /// Covered buckets without a file
    pub files_missing: usize,
    /// Entries returned by queries
    pub entries_returned: usize,
    /// Unparseable headers encountered
    pub malformed_lines: usize,
    /// Average write latency
    pub avg_write_latency: Duration,
    /// Average query latency
    pub avg_query_latency: Duration,
    /// Time since the store was opened
    pub uptime: Duration,
}

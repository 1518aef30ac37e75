//! Benchmarks for the read and write paths.
//!
//! Run with: cargo bench

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logstrata::query::FileParser;
use logstrata::{BucketWidth, FixedClock, Level, LogEntry, LogStore, MalformedLinePolicy, StoreConfig, TimeRange};
use tempfile::TempDir;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

/// One hour of records, every tenth carrying a short trace
fn generate_entries(count: usize) -> Vec<LogEntry> {
    let step = 3_600_000 / count as i64;
    (0..count)
        .map(|i| {
            let entry = LogEntry::new(
                base() + Duration::milliseconds(i as i64 * step),
                Level::Info,
                "service.worker",
                format!("processed job {} in {}ms", i, i % 97),
            )
            .with_origin_line((i % 500) as u32);
            if i % 10 == 0 {
                entry.with_detail(["Traceback (most recent call last):", "  File \"worker.py\", line 12", "KeyError: 'id'"])
            } else {
                entry
            }
        })
        .collect()
}

fn bench_parse_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_file");

    for count in [1_000usize, 10_000] {
        let text: String = generate_entries(count).iter().map(LogEntry::to_record).collect();
        let path = Path::new("info_2024-05-15_00.log");
        group.throughput(Throughput::Bytes(text.len() as u64));

        let full = TimeRange::new(base(), base() + Duration::hours(1));
        group.bench_with_input(BenchmarkId::new("full_range", count), &text, |b, text| {
            b.iter(|| {
                let mut parser = FileParser::new(Level::Info, full, MalformedLinePolicy::Skip, path);
                parser.parse(black_box(text.as_bytes())).unwrap();
                parser.into_entries()
            })
        });

        // Early exit after the first few minutes
        let head = TimeRange::new(base(), base() + Duration::minutes(5));
        group.bench_with_input(BenchmarkId::new("early_exit", count), &text, |b, text| {
            b.iter(|| {
                let mut parser = FileParser::new(Level::Info, head, MalformedLinePolicy::Skip, path);
                parser.parse(black_box(text.as_bytes())).unwrap();
                parser.into_entries()
            })
        });
    }

    group.finish();
}

fn bench_query_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_store");

    for parallel in [false, true] {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::new()
            .with_directory(temp_dir.path())
            .with_bucket_width(BucketWidth::HOURLY)
            .with_parallel_query_execution(parallel)
            .with_collect_metrics(false);
        let store = LogStore::open(config, Arc::new(FixedClock::at_local(base()))).unwrap();

        // Twelve hourly files
        for hour in 0..12 {
            for mut entry in generate_entries(2_000) {
                entry.timestamp += Duration::hours(hour);
                store.write(&entry).unwrap();
            }
        }

        let name = if parallel { "parallel" } else { "sequential" };
        group.bench_function(name, |b| {
            b.iter(|| {
                store
                    .query(Level::Info, black_box(base()), black_box(base() + Duration::hours(12)))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let config = StoreConfig::new().with_directory(temp_dir.path()).with_collect_metrics(false);
    let store = LogStore::open(config, Arc::new(FixedClock::at_local(base()))).unwrap();
    let entry = generate_entries(10).remove(0);

    c.bench_function("write_with_detail", |b| b.iter(|| store.write(black_box(&entry)).unwrap()));
}

criterion_group!(benches, bench_parse_file, bench_query_store, bench_write);
criterion_main!(benches);

//! Benchmarks for report streaming and ingestion
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use scanstore::ingest::{IngestOptions, ReportBuilder, ReportIngestor, REPORT_SUBSCRIPTIONS};
use scanstore::storage::{Compression, SqliteStore};
use scanstore::stream::{MatchHandler, MatchResult, StreamError, StreamParser};
use serde_json::{json, Value};
use std::sync::Arc;

/// Report with `operations` operations, each with a happy path and `tests` tests
fn synthetic_report(operations: usize, tests: usize) -> String {
    let methods = ["get", "post", "put", "delete"];
    let mut ops = serde_json::Map::new();

    for i in 0..operations {
        let results: Vec<Value> = (0..tests)
            .map(|t| {
                json!({
                    "test": {"key": format!("test-{}", t % 7)},
                    "request": {"headers": {"accept": "application/json"}, "body": "x".repeat(64)},
                    "outcome": {"criticality": (i + t) % 6, "status": "incorrect"}
                })
            })
            .collect();

        ops.insert(
            format!("op{:05}", operations - i),
            json!({
                "operationId": format!("op{:05}", operations - i),
                "path": format!("/resource{}/{{id}}", i % 50),
                "method": methods[i % methods.len()],
                "scenarios": [{"key": "happy.path", "outcome": {"status": "correct"}}],
                "conformanceRequestsResults": results
            }),
        );
    }

    json!({
        "scanVersion": "2.0.0",
        "summary": {"state": "finished", "totalTests": operations * tests},
        "operations": ops
    })
    .to_string()
}

struct Counter(usize);

impl MatchHandler<u8> for Counter {
    type Error = StreamError;

    fn on_match(&mut self, _matched: &MatchResult<u8>, _value: Value) -> Result<(), StreamError> {
        self.0 += 1;
        Ok(())
    }
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");
    let report = synthetic_report(200, 20);
    group.throughput(Throughput::Bytes(report.len() as u64));

    group.bench_function("tokenize_shallow_only", |b| {
        b.iter(|| {
            let mut parser = StreamParser::from_patterns([("$.operations.*.shallow()", 0u8)]).unwrap();
            let mut counter = Counter(0);
            for chunk in report.as_bytes().chunks(64 * 1024) {
                parser.feed(black_box(chunk), &mut counter).unwrap();
            }
            parser.end(&mut counter).unwrap();
            counter.0
        })
    });

    group.bench_function("project_report", |b| {
        b.iter(|| {
            let mut parser = StreamParser::from_patterns(REPORT_SUBSCRIPTIONS).unwrap();
            let mut builder = ReportBuilder::new();
            for chunk in report.as_bytes().chunks(64 * 1024) {
                parser.feed(black_box(chunk), &mut builder).unwrap();
            }
            parser.end(&mut builder).unwrap();
            builder.counts()
        })
    });

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("ingest");
    group.sample_size(10);

    for (operations, tests) in [(50, 10), (200, 20)] {
        let report = synthetic_report(operations, tests);
        group.throughput(Throughput::Bytes(report.len() as u64));

        group.bench_function(format!("in_memory_{}x{}", operations, tests), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let store = Arc::new(SqliteStore::in_memory(Compression::Lz4).unwrap());
                    let mut ingestor = ReportIngestor::start(store, IngestOptions::default())
                        .await
                        .unwrap();
                    for chunk in report.as_bytes().chunks(64 * 1024) {
                        ingestor.feed(black_box(chunk)).await.unwrap();
                    }
                    ingestor.finish().await.unwrap()
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stream, bench_ingest);
criterion_main!(benches);

//! Kotoba Scan Benchmarks
//!
//! Compares the two scan strategies over populated stores.
//! Run with: cargo bench -p kotoba-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kotoba_core::storage::{
    Database, IndexDefinition, KeyRange, ScanMode, SchemaUpgrade, StoreDefinition,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BenchTerm {
    id: i64,
    dictionary: String,
    expression: String,
}

const STORES: &[StoreDefinition] = &[StoreDefinition {
    name: "terms",
    primary_key: "id",
    indices: &[IndexDefinition {
        field: "dictionary",
        unique: false,
    }],
}];

const UPGRADES: &[SchemaUpgrade] = &[SchemaUpgrade {
    version: 1,
    description: "bench store",
    stores: STORES,
}];

const ROWS: i64 = 2_000;

fn seeded_database(
    runtime: &tokio::runtime::Runtime,
    dir: &TempDir,
    scan_mode: ScanMode,
) -> Database {
    let db = Database::with_scan_mode(Some(dir.path().to_path_buf()), scan_mode);
    runtime.block_on(async {
        db.open("bench", 1, UPGRADES).await.unwrap();
        let items: Vec<BenchTerm> = (1..=ROWS)
            .map(|id| BenchTerm {
                id,
                dictionary: if id % 2 == 0 { "even" } else { "odd" }.to_string(),
                expression: format!("word{id:05}"),
            })
            .collect();
        db.bulk_add("terms", items, 0, ROWS as usize).await.unwrap();
    });
    db
}

fn bench_scan_all(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("scan_all");

    for (label, mode) in [("bulk_fetch", ScanMode::BulkFetch), ("cursor", ScanMode::Cursor)] {
        let dir = TempDir::new().unwrap();
        let db = seeded_database(&runtime, &dir, mode);
        group.bench_function(label, |b| {
            b.iter(|| {
                let rows: Vec<BenchTerm> =
                    runtime.block_on(db.scan_all("terms", None, None)).unwrap();
                black_box(rows);
            })
        });
    }
    group.finish();
}

fn bench_index_scan(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("index_scan");

    for (label, mode) in [("bulk_fetch", ScanMode::BulkFetch), ("cursor", ScanMode::Cursor)] {
        let dir = TempDir::new().unwrap();
        let db = seeded_database(&runtime, &dir, mode);
        group.bench_function(label, |b| {
            b.iter(|| {
                let rows: Vec<BenchTerm> = runtime
                    .block_on(db.scan_all(
                        "terms",
                        Some("dictionary"),
                        Some(KeyRange::only("even")),
                    ))
                    .unwrap();
                black_box(rows);
            })
        });
    }
    group.finish();
}

fn bench_scan_keys(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = TempDir::new().unwrap();
    let db = seeded_database(&runtime, &dir, ScanMode::BulkFetch);

    c.bench_function("scan_keys_all", |b| {
        b.iter(|| {
            let keys = runtime
                .block_on(db.scan_keys_all("terms", None, None))
                .unwrap();
            black_box(keys);
        })
    });
}

criterion_group!(benches, bench_scan_all, bench_index_scan, bench_scan_keys);
criterion_main!(benches);

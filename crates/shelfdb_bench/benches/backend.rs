//! Log-backed store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shelfdb_bench::{random_data, shuffled_number_keys};
use shelfdb_codec::encode_key;
use shelfdb_core::{Direction, EncodedRange, WalBackend};
use shelfdb_storage::FileBackend;
use tempfile::TempDir;

fn encoded_keys(count: u32) -> Vec<Vec<u8>> {
    shuffled_number_keys(count)
        .iter()
        .map(|k| encode_key(k).unwrap())
        .collect()
}

fn filled(keys: &[Vec<u8>], value_size: usize) -> WalBackend {
    let mut backend = WalBackend::in_memory();
    let value = random_data(value_size);
    for key in keys {
        backend.put("s", key.clone(), value.clone()).unwrap();
    }
    backend
}

/// Benchmark single puts of different value sizes.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_put");

    for size in [16usize, 256, 4096] {
        let value = random_data(size);
        let keys = encoded_keys(1000);
        group.throughput(Throughput::Bytes((size * keys.len()) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &value, |b, value| {
            b.iter(|| {
                let mut backend = WalBackend::in_memory();
                for key in &keys {
                    backend.put("s", key.clone(), value.clone()).unwrap();
                }
                black_box(backend);
            });
        });
    }

    group.finish();
}

/// Benchmark point reads against a populated store.
fn bench_get(c: &mut Criterion) {
    let keys = encoded_keys(10_000);
    let backend = filled(&keys, 64);

    c.bench_function("backend_get_10000", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(backend.get("s", black_box(key)));
            }
        });
    });
}

/// Benchmark ordered scans in both directions.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_scan");

    for count in [100u32, 1000, 10_000] {
        let backend = filled(&encoded_keys(count), 64);
        group.throughput(Throughput::Elements(u64::from(count)));
        for direction in [Direction::Next, Direction::Prev] {
            let id = BenchmarkId::new(format!("{direction:?}"), count);
            group.bench_function(id, |b| {
                b.iter(|| {
                    let records = backend.scan("s", &EncodedRange::all(), direction);
                    black_box(records);
                });
            });
        }
    }

    group.finish();
}

/// Benchmark one batch line against the same writes done one by one.
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_batch_1000");
    let keys = encoded_keys(1000);
    let value = random_data(64);

    group.bench_function("single_puts", |b| {
        b.iter(|| {
            let mut backend = WalBackend::in_memory();
            for key in &keys {
                backend.put("s", key.clone(), value.clone()).unwrap();
            }
            black_box(backend);
        });
    });
    group.bench_function("one_batch", |b| {
        b.iter(|| {
            let mut backend = WalBackend::in_memory();
            let ops = keys
                .iter()
                .map(|key| shelfdb_core::WriteOp::Put {
                    store: "s".to_string(),
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            backend.apply_batch(ops).unwrap();
            black_box(backend);
        });
    });

    group.finish();
}

/// Benchmark replaying a log from disk.
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_replay");
    group.sample_size(20);

    for count in [1000u32, 10_000] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        {
            let file = FileBackend::open_with_create_dirs(&path).unwrap();
            let mut backend = WalBackend::open(Box::new(file), false).unwrap();
            let value = random_data(64);
            for key in encoded_keys(count) {
                backend.put("s", key, value.clone()).unwrap();
            }
        }

        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &path, |b, path| {
            b.iter(|| {
                let file = FileBackend::open(path).unwrap();
                let backend = WalBackend::open(Box::new(file), false).unwrap();
                black_box(backend.len("s"));
            });
        });
    }

    group.finish();
}

/// Benchmark compacting a log where half the records were overwritten.
fn bench_compact(c: &mut Criterion) {
    let keys = encoded_keys(5000);
    let value = random_data(64);

    c.bench_function("backend_compact_5000", |b| {
        b.iter_batched(
            || {
                let mut backend = filled(&keys, 64);
                for key in keys.iter().step_by(2) {
                    backend.put("s", key.clone(), value.clone()).unwrap();
                }
                backend
            },
            |mut backend| {
                let report = backend.compact().unwrap();
                black_box(report);
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_scan,
    bench_batch,
    bench_replay,
    bench_compact,
);

criterion_main!(benches);

//! Key codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shelfdb_bench::{mixed_keys, shuffled_number_keys};
use shelfdb_codec::{decode_key, encode_key, Key, KeyEncoder};

/// Benchmark encoding one key of each type.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (name, key) in mixed_keys() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = encode_key(black_box(&key)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark decoding one key of each type.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for (name, key) in mixed_keys() {
        let bytes = encode_key(&key).unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let result = decode_key(black_box(&bytes)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark string keys of growing length.
fn bench_string_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_string");

    for len in [8usize, 64, 512, 4096] {
        let key = Key::String("é".repeat(len / 2));
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &key, |b, key| {
            b.iter(|| {
                let result = encode_key(black_box(key)).unwrap();
                black_box(result);
            });
        });
    }

    group.finish();
}

/// Benchmark reusing one encoder buffer across many keys.
fn bench_encoder_reuse(c: &mut Criterion) {
    let keys = shuffled_number_keys(1000);
    c.bench_function("encoder_reuse_1000_numbers", |b| {
        b.iter(|| {
            let mut encoder = KeyEncoder::with_capacity(9 * keys.len());
            for key in &keys {
                encoder.encode(black_box(key));
            }
            black_box(encoder.into_bytes());
        });
    });
}

/// Benchmark sorting encoded keys against sorting decoded keys.
fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_1000");
    let keys = shuffled_number_keys(1000);
    let encoded: Vec<Vec<u8>> = keys.iter().map(|k| encode_key(k).unwrap()).collect();

    group.bench_function("encoded", |b| {
        b.iter(|| {
            let mut sorted = encoded.clone();
            sorted.sort();
            black_box(sorted);
        });
    });
    group.bench_function("decoded", |b| {
        b.iter(|| {
            let mut sorted = keys.clone();
            sorted.sort();
            black_box(sorted);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_string_size,
    bench_encoder_reuse,
    bench_sort,
);

criterion_main!(benches);

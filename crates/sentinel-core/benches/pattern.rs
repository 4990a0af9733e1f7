//! Benchmarks for pattern generation and chunk digests.
//!
//! Run with: cargo bench -p sentinel-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sentinel_core::pattern::{sha256_hex, sha256_reader, PatternGenerator};
use std::hint::black_box;
use std::io::Cursor;

const SIZES: [(usize, &str); 3] = [
    (64 * 1024, "64KB"),
    (1024 * 1024, "1MB"),
    (4 * 1024 * 1024, "4MB"),
];

/// Pattern fill is on the write path for every chunk
fn bench_pattern_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_fill");
    let gen = PatternGenerator::new(0x5EED);

    for (size, name) in SIZES {
        let mut buf = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            let mut index = 0u64;
            b.iter(|| {
                gen.fill(black_box(index), &mut buf);
                index += 1;
            });
        });
    }

    group.finish();
}

/// Chunk digests are computed on both write and read-back
fn bench_chunk_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_digest");
    let gen = PatternGenerator::new(7);

    for (size, name) in SIZES {
        let mut data = vec![0u8; size];
        gen.fill(0, &mut data);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| sha256_hex(black_box(data)));
        });
    }

    group.finish();
}

/// Manifest hashing buffer sizes
fn bench_file_hash_buffers(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest_hash");
    let mut data = vec![0u8; 8 * 1024 * 1024];
    PatternGenerator::new(1).fill(0, &mut data);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for (buf_size, name) in [(64 * 1024, "64KB"), (1024 * 1024, "1MB")] {
        group.bench_with_input(BenchmarkId::new("buffer", name), &buf_size, |b, &buf_size| {
            b.iter(|| sha256_reader(Cursor::new(black_box(&data)), buf_size).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pattern_fill,
    bench_chunk_digest,
    bench_file_hash_buffers
);
criterion_main!(benches);

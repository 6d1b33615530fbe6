use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_jwks::crypto::{KeyMaterialFactory, StorageKey};
use rust_jwks::jwk::{JwkConverter, KeyRecord};
use rust_jwks::storage::{FileStore, KeyStore, MemoryStore, StorageConfig};
use rust_jwks::{Algorithm, KeyUse};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Helper function to create a test record
fn create_test_record(algorithm: Algorithm) -> KeyRecord {
    let generated = KeyMaterialFactory::default()
        .generate(algorithm)
        .expect("Failed to generate key");
    JwkConverter::to_record(&generated, SystemTime::now(), Duration::from_secs(3600)).expect("Failed to build record")
}

/// Benchmark MemoryStore operations
fn bench_memory_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_store");

    group.bench_function("save", |b| {
        b.iter_batched(
            || (MemoryStore::new(), create_test_record(Algorithm::HS256)),
            |(store, record)| store.save(black_box(record)).expect("Failed to save record"),
            criterion::BatchSize::SmallInput,
        );
    });

    // Current-key selection scans every record of the slot
    for count in [10usize, 100, 1000] {
        let store = MemoryStore::new();
        for _ in 0..count {
            store.save(create_test_record(Algorithm::HS256)).expect("Failed to save record");
        }

        group.bench_with_input(BenchmarkId::new("get_current_key", count), &store, |b, store| {
            b.iter(|| store.get_current_key(black_box(KeyUse::Signing)).expect("No current key"));
        });
        group.bench_with_input(BenchmarkId::new("get_last_5", count), &store, |b, store| {
            b.iter(|| store.get_last(black_box(KeyUse::Signing), 5).expect("Failed to list"));
        });
    }

    group.finish();
}

/// Benchmark FileStore operations
fn bench_file_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_store");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("save_plaintext", |b| {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path(), StorageConfig::default()).expect("Failed to open store");
        b.iter_batched(
            || create_test_record(Algorithm::ES256),
            |record| store.save(black_box(record)).expect("Failed to save record"),
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("save_encrypted", |b| {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let key = StorageKey::generate().expect("Failed to generate storage key");
        let store = FileStore::open_encrypted(temp_dir.path(), StorageConfig::default(), key)
            .expect("Failed to open store");
        b.iter_batched(
            || create_test_record(Algorithm::ES256),
            |record| store.save(black_box(record)).expect("Failed to save record"),
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("open_100_records", |b| {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        {
            let store = FileStore::new(temp_dir.path(), StorageConfig::default()).expect("Failed to open store");
            for _ in 0..100 {
                store.save(create_test_record(Algorithm::ES256)).expect("Failed to save record");
            }
        }
        b.iter(|| FileStore::new(black_box(temp_dir.path()), StorageConfig::default()).expect("Failed to open"));
    });

    group.finish();
}

criterion_group!(benches, bench_memory_store, bench_file_store);
criterion_main!(benches);

//! Benchmarks comparing this crate against `std::collections::HashMap` and
//! `hashbrown::HashMap`, grounded in the teacher's own `main.rs`
//! `Instant`-based harness (here run through `criterion` instead) and
//! `britt-marie`'s `[[bench]]` entries.

use std::collections::HashMap as StdHashMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use extendible_swiss_map::{Map, MapBuilder};
use hashbrown::HashMap as HashbrownMap;

const SIZES: [u64; 3] = [1_000, 50_000, 500_000];

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for &n in &SIZES {
        group.bench_with_input(BenchmarkId::new("extendible_swiss_map", n), &n, |b, &n| {
            b.iter(|| {
                let mut map: Map<u64, u64> = Map::default();
                for k in 0..n {
                    map.insert(k, k);
                }
                map
            });
        });
        group.bench_with_input(BenchmarkId::new("std::HashMap", n), &n, |b, &n| {
            b.iter(|| {
                let mut map = StdHashMap::new();
                for k in 0..n {
                    map.insert(k, k);
                }
                map
            });
        });
        group.bench_with_input(BenchmarkId::new("hashbrown::HashMap", n), &n, |b, &n| {
            b.iter(|| {
                let mut map = HashbrownMap::new();
                for k in 0..n {
                    map.insert(k, k);
                }
                map
            });
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hit");
    for &n in &SIZES {
        let mut map: Map<u64, u64> = Map::default();
        let mut std_map = StdHashMap::new();
        let mut hb_map = HashbrownMap::new();
        for k in 0..n {
            map.insert(k, k);
            std_map.insert(k, k);
            hb_map.insert(k, k);
        }
        group.bench_with_input(BenchmarkId::new("extendible_swiss_map", n), &n, |b, &n| {
            b.iter(|| {
                let mut sum = 0u64;
                for k in 0..n {
                    sum = sum.wrapping_add(*map.get(&k).unwrap());
                }
                sum
            });
        });
        group.bench_with_input(BenchmarkId::new("std::HashMap", n), &n, |b, &n| {
            b.iter(|| {
                let mut sum = 0u64;
                for k in 0..n {
                    sum = sum.wrapping_add(*std_map.get(&k).unwrap());
                }
                sum
            });
        });
        group.bench_with_input(BenchmarkId::new("hashbrown::HashMap", n), &n, |b, &n| {
            b.iter(|| {
                let mut sum = 0u64;
                for k in 0..n {
                    sum = sum.wrapping_add(*hb_map.get(&k).unwrap());
                }
                sum
            });
        });
    }
    group.finish();
}

/// Split-vs-resize cost: a tiny `max_bucket_capacity` forces a split on
/// almost every growth step, versus the effectively-unbounded default
/// which only ever resizes its single bucket in place.
fn bench_split_vs_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_vs_resize");
    let n = 200_000u64;
    group.bench_function("small_max_bucket_capacity_forces_splits", |b| {
        b.iter(|| {
            let mut map: Map<u64, u64> = MapBuilder::new().with_max_bucket_capacity(63).build();
            for k in 0..n {
                map.insert(k, k);
            }
            map
        });
    });
    group.bench_function("large_max_bucket_capacity_prefers_resize", |b| {
        b.iter(|| {
            let mut map: Map<u64, u64> = MapBuilder::new()
                .with_max_bucket_capacity(usize::MAX / 2)
                .build();
            for k in 0..n {
                map.insert(k, k);
            }
            map
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_split_vs_resize);
criterion_main!(benches);

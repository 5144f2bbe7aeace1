//! # Keyed Free-List Benchmark
//!
//! Reuse must stay O(1) regardless of how many descriptor classes are pooled.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::KeyedFreeList;

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_list_push_pop");

    for key_count in [1u32, 64, 4096] {
        let mut free: KeyedFreeList<(u32, u32), u64> = KeyedFreeList::new(16);
        for key in 0..key_count {
            for id in 0..8 {
                free.push((key, key), u64::from(id)).ok();
            }
        }

        group.bench_with_input(
            BenchmarkId::new("reuse", key_count),
            &key_count,
            |b, &keys| {
                let mut key = 0u32;
                b.iter(|| {
                    key = (key + 1) % keys;
                    let value = free.pop(&(key, key)).unwrap_or(0);
                    free.push((key, key), black_box(value)).ok();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_push_pop);
criterion_main!(benches);

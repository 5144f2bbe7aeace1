//! # Triple Buffer Benchmark
//!
//! Measures the cost of the handoff itself, independent of snapshot size:
//! 1. Commit only (producer running ahead of a stalled consumer)
//! 2. Commit + read cycle (one frame handed over per iteration)
//! 3. Snapshot payload sizes typical of a render state
//!
//! Target: handoff overhead well under 1µs per frame.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::TripleBuffer;

/// Producer commits while nobody reads (latest-wins path).
fn bench_commit_only(c: &mut Criterion) {
    let (mut writer, _reader) = TripleBuffer::new(0u64);

    c.bench_function("triple_buffer_commit_only", |b| {
        let mut value = 0u64;
        b.iter(|| {
            value += 1;
            *writer.current_write_state() = value;
            black_box(writer.commit_write());
        });
    });
}

/// One full frame handoff per iteration.
fn bench_commit_read_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("triple_buffer_cycle");

    for payload_len in [16usize, 4096, 65_536] {
        let (mut writer, mut reader) = TripleBuffer::new(vec![0u8; payload_len]);

        group.throughput(criterion::Throughput::Bytes(payload_len as u64));
        group.bench_with_input(
            BenchmarkId::new("commit_read", payload_len),
            &payload_len,
            |b, _| {
                let mut frame = 0u8;
                b.iter(|| {
                    frame = frame.wrapping_add(1);
                    writer.current_write_state().fill(frame);
                    writer.commit_write();

                    let state = reader.start_read();
                    black_box(state[0]);
                    black_box(reader.stop_read());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_commit_only, bench_commit_read_cycle);
criterion_main!(benches);

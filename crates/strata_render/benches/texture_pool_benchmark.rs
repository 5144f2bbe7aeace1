//! # Texture Pool Benchmark
//!
//! Admission and release sit on the extraction thread's tick; both must stay
//! flat as the number of descriptor classes grows.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_render::gpu::GpuTextureId;
use strata_render::streaming::{Admission, PixelFormat, TextureDescriptor, TexturePool, UploadQueue, UploadTask, TextureId};

fn descriptors(count: u32) -> Vec<TextureDescriptor> {
    (0..count)
        .map(|i| TextureDescriptor::new_2d(16 + i, 16, PixelFormat::Rgba8))
        .collect()
}

fn bench_admit_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("texture_pool_admit_release");

    for classes in [1u32, 64, 1024] {
        let pool = TexturePool::new(8);
        let descs = descriptors(classes);
        for (i, desc) in descs.iter().enumerate() {
            pool.release(desc, GpuTextureId(i as u32)).ok();
        }

        group.bench_with_input(BenchmarkId::new("reuse", classes), &descs, |b, descs| {
            let mut next = 0usize;
            b.iter(|| {
                let desc = &descs[next % descs.len()];
                next += 1;
                if let Admission::Reused(id) = pool.admit(desc) {
                    pool.release(desc, black_box(id)).ok();
                } else {
                    pool.cancel_allocation(desc);
                }
            });
        });
    }

    group.finish();
}

fn bench_upload_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("upload_queue");

    for depth in [16u64, 1024] {
        group.bench_with_input(BenchmarkId::new("push_pop", depth), &depth, |b, &depth| {
            let queue = UploadQueue::new();
            b.iter(|| {
                for texture in 0..depth {
                    queue.push(UploadTask {
                        texture: TextureId(texture),
                        mip_level: (texture % 12) as u32,
                    });
                }
                while let Some(task) = queue.try_pop() {
                    black_box(task);
                    queue.finish(None);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_admit_release, bench_upload_queue);
criterion_main!(benches);

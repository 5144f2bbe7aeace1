//! # Texture Streaming Tests
//!
//! End-to-end residency behavior with a headless backend on a real GPU
//! thread and real upload workers:
//!
//! 1. **Ordering**: mips land coarsest first
//! 2. **Residency**: unused textures are never uploaded, idle ones are evicted and pooled
//! 3. **Pressure**: concurrency cap, resident budget and allocation failures degrade to fallbacks
//!
//! Run with: cargo test -p strata_render --test texture_streaming

use std::sync::Arc;
use std::time::Duration;

use strata_render::gpu::{GpuThread, HeadlessBackend};
use strata_render::streaming::{
    MipChain, PixelFormat, Rgba8, TextureDescriptor, TextureId, TextureManager, TextureSource, UploadState, WrapMode,
};
use strata_render::{FallbackRetryPolicy, FramePump, PumpConfig, RenderError, RenderResult, StreamingConfig};

const IDLE: Duration = Duration::from_secs(5);

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn start(config: StreamingConfig) -> (GpuThread<HeadlessBackend>, TextureManager<HeadlessBackend>) {
    let gpu = GpuThread::spawn(
        || Ok(HeadlessBackend::new()),
        FramePump::<HeadlessBackend>::new(PumpConfig::default()),
    )
    .expect("GPU thread starts");
    let manager = TextureManager::new(gpu.handle(), config).expect("manager starts");
    (gpu, manager)
}

fn texture(name: &str, size: u32) -> Arc<MipChain> {
    Arc::new(MipChain::solid(name, size, Rgba8::new(200, 100, 50, 255)))
}

/// Same texels as [`texture`], sampled with clamped coordinates, so it never
/// shares pooled storage with it.
fn clamped_texture(name: &str, size: u32) -> Arc<MipChain> {
    let base = texture(name, size);
    let descriptor = base.descriptor();
    let levels = (0..descriptor.mip_levels)
        .map(|level| base.load_mip(level).unwrap())
        .collect();
    Arc::new(MipChain::from_levels(name, descriptor.with_wrap(WrapMode::ClampToEdge), levels).unwrap())
}

fn allocations(gpu: &GpuThread<HeadlessBackend>) -> usize {
    gpu.handle()
        .call(|ctx| Ok(ctx.backend().allocation_count()))
        .expect("GPU thread alive")
}

/// Waits until the backend holds at most `bytes`; deletes are posted, so they
/// land a pump tick after the manager issues them.
fn wait_for_allocated_at_most(gpu: &GpuThread<HeadlessBackend>, bytes: u64) {
    let handle = gpu.handle();
    let deadline = std::time::Instant::now() + IDLE;
    loop {
        let live = handle.call(|ctx| Ok(ctx.backend().allocated_bytes())).unwrap();
        if live <= bytes {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "{live} bytes still allocated");
        std::thread::sleep(Duration::from_millis(1));
    }
}

struct Misdescribed(TextureDescriptor);

impl TextureSource for Misdescribed {
    fn name(&self) -> &str {
        "misdescribed"
    }

    fn descriptor(&self) -> TextureDescriptor {
        self.0
    }

    fn load_mip(&self, level: u32) -> RenderResult<Arc<[u8]>> {
        Ok(Arc::from(vec![0u8; self.0.mip_size_bytes(level)]))
    }
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_mips_land_coarse_to_fine() {
    let (gpu, mut manager) = start(StreamingConfig::default());
    let id = manager.register_dynamic(texture("albedo", 64), None).unwrap();

    let report = manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert_eq!(report.marked, 1);
    assert_eq!(report.promoted, vec![id]);
    assert!(matches!(
        manager.upload_state(id),
        Some(UploadState::Uploading { .. } | UploadState::Uploaded)
    ));

    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(id), Some(UploadState::Uploaded));

    let backing = manager.backing(id).unwrap();
    let mut levels = gpu
        .handle()
        .call(move |ctx| Ok(ctx.backend().upload_levels(backing)))
        .unwrap();
    // Large mips arrive in several bands; each level must appear exactly once
    // after collapsing its bands.
    levels.dedup();
    assert_eq!(levels, vec![6, 5, 4, 3, 2, 1, 0]);

    let stats = manager.stats();
    assert_eq!(stats.mips_uploaded, 7);
    assert_eq!(stats.textures_completed, 1);
}

#[test]
fn test_mip_bias_decays_to_full_detail() {
    let (_gpu, mut manager) = start(StreamingConfig {
        mip_bias_decay_per_sec: 1.0,
        ..StreamingConfig::default()
    });
    let id = manager.register_dynamic(texture("detail", 64), None).unwrap();
    assert_eq!(manager.mip_bias(id), Some(7.0));

    manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));

    manager.update(secs(1.0), &[(id, 1.0)]).unwrap();
    assert_eq!(manager.mip_bias(id), Some(6.0));
    manager.update(secs(3.0), &[(id, 1.0)]).unwrap();
    assert_eq!(manager.mip_bias(id), Some(4.0));
    manager.update(secs(30.0), &[(id, 1.0)]).unwrap();
    assert_eq!(manager.mip_bias(id), Some(0.0));
}

// ============================================================================
// RESIDENCY
// ============================================================================

#[test]
fn test_unused_texture_is_never_uploaded() {
    let (gpu, mut manager) = start(StreamingConfig::default());
    let id = manager.register_dynamic(texture("unused", 32), None).unwrap();

    for step in 0..5 {
        let report = manager.update(secs(f64::from(step)), &[]).unwrap();
        assert_eq!(report.marked, 0);
    }
    assert_eq!(manager.upload_state(id), Some(UploadState::Unloaded));
    assert_eq!(allocations(&gpu), 0);
}

#[test]
fn test_far_texture_is_not_uploaded() {
    let (gpu, mut manager) = start(StreamingConfig {
        unload_distance: 10.0,
        ..StreamingConfig::default()
    });
    let id = manager.register_dynamic(texture("horizon", 32), None).unwrap();

    manager.update(secs(0.0), &[(id, 500.0)]).unwrap();
    assert_eq!(manager.upload_state(id), Some(UploadState::Unloaded));
    assert_eq!(allocations(&gpu), 0);
}

#[test]
fn test_near_texture_resident_until_delay_elapses() {
    let (_gpu, mut manager) = start(StreamingConfig {
        unload_delay_secs: 10.0,
        unload_distance: 50.0,
        ..StreamingConfig::default()
    });
    let id = manager.register_dynamic(texture("crate", 16), None).unwrap();
    manager.update(secs(0.0), &[(id, 5.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));

    for now in [1.0, 5.0, 9.9, 10.0] {
        let report = manager.tick(secs(now)).unwrap();
        assert!(report.evicted.is_empty(), "evicted at {now}s");
        assert_eq!(manager.upload_state(id), Some(UploadState::Uploaded));
    }
    let report = manager.tick(secs(10.5)).unwrap();
    assert_eq!(report.evicted, vec![id]);
}

#[test]
fn test_idle_texture_evicted_and_storage_reused() {
    let (gpu, mut manager) = start(StreamingConfig {
        unload_delay_secs: 1.0,
        ..StreamingConfig::default()
    });
    let a = manager.register_dynamic(texture("a", 32), None).unwrap();
    manager.update(secs(0.0), &[(a, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));
    let backing = manager.backing(a).unwrap();

    let report = manager.tick(secs(0.5)).unwrap();
    assert!(report.evicted.is_empty());
    assert_eq!(manager.eviction_candidates(secs(2.0)), vec![a]);
    // Asking twice changes nothing.
    assert_eq!(manager.eviction_candidates(secs(2.0)), vec![a]);
    assert_eq!(manager.upload_state(a), Some(UploadState::Uploaded));

    let report = manager.tick(secs(2.0)).unwrap();
    assert_eq!(report.evicted, vec![a]);
    assert_eq!(manager.upload_state(a), Some(UploadState::Unloaded));
    assert_eq!(manager.backing(a), None);
    assert_eq!(manager.resolve(a), None);
    assert_eq!(manager.pool_stats().recycled, 1);

    // Same descriptor: the evicted storage comes back.
    let b = manager.register_dynamic(texture("b", 32), None).unwrap();
    manager.update(secs(2.1), &[(b, 1.0)]).unwrap();
    assert_eq!(manager.backing(b), Some(backing));
    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(b), Some(UploadState::Uploaded));

    let stats = manager.stats();
    assert_eq!(stats.pool_hits, 1);
    assert_eq!(stats.evictions, 1);
    assert_eq!(allocations(&gpu), 1);
}

#[test]
fn test_eviction_in_same_tick_frees_storage_for_promotion() {
    let one_texture = texture("sizing", 32).descriptor().size_bytes();
    let (gpu, mut manager) = start(StreamingConfig {
        unload_delay_secs: 1.0,
        resident_budget_bytes: Some(one_texture),
        fallback_retry: FallbackRetryPolicy::Manual,
        ..StreamingConfig::default()
    });
    let old = manager.register_dynamic(texture("old", 32), None).unwrap();
    manager.update(secs(0.0), &[(old, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));
    let backing = manager.backing(old).unwrap();

    // `old` turns idle in the same tick `new` is first needed.
    let new = manager.register_dynamic(texture("new", 32), None).unwrap();
    let report = manager.update(secs(2.0), &[(new, 1.0)]).unwrap();
    assert_eq!(report.evicted, vec![old]);
    assert_eq!(report.promoted, vec![new]);
    assert_eq!(report.fallbacks, 0);
    assert_eq!(manager.backing(new), Some(backing));

    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(new), Some(UploadState::Uploaded));
    assert_eq!(allocations(&gpu), 1);
}

#[test]
fn test_unregister_returns_storage() {
    let (_gpu, mut manager) = start(StreamingConfig::default());
    let fallback = manager
        .create_static(&MipChain::solid("grey", 4, Rgba8::new(128, 128, 128, 255)))
        .unwrap();
    let id = manager.register_dynamic(texture("gone", 16), Some(fallback)).unwrap();
    manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.resolve(id).map(|r| r.texture), Some(id));

    manager.unregister(id).unwrap();
    assert_eq!(manager.upload_state(id), None);
    assert_eq!(manager.resolve(id), None);
    assert_eq!(manager.pool_stats().recycled, 1);
    assert!(manager.unregister(id).is_err());
    assert_eq!(manager.stats().resident_bytes, 0);
}

// ============================================================================
// PRESSURE
// ============================================================================

#[test]
fn test_concurrent_uploads_capped_by_staging_buffers() {
    let (_gpu, mut manager) = start(StreamingConfig {
        staging_buffer_count: 2,
        staging_buffer_size: 256,
        ..StreamingConfig::default()
    });
    let ids: Vec<TextureId> = (0..5)
        .map(|i| manager.register_dynamic(texture(&format!("t{i}"), 32), None).unwrap())
        .collect();
    let visible: Vec<(TextureId, f32)> = ids.iter().map(|&id| (id, 1.0)).collect();

    let report = manager.update(secs(0.0), &visible).unwrap();
    assert_eq!(report.marked, 5);
    assert_eq!(report.promoted.len(), 2);

    for step in 1..50 {
        let uploading = ids
            .iter()
            .filter(|&&id| matches!(manager.upload_state(id), Some(UploadState::Uploading { .. })))
            .count();
        assert!(uploading <= 2, "{uploading} textures uploading at once");
        assert!(manager.wait_idle(IDLE));
        if ids.iter().all(|&id| manager.upload_state(id) == Some(UploadState::Uploaded)) {
            break;
        }
        manager.update(secs(f64::from(step) * 0.01), &visible).unwrap();
    }

    assert!(ids.iter().all(|&id| manager.upload_state(id) == Some(UploadState::Uploaded)));
    let stats = manager.stats();
    assert_eq!(stats.peak_concurrent_uploads, 2);
    assert_eq!(stats.textures_completed, 5);
    assert!(manager.staging_in_flight() <= 2);
}

#[test]
fn test_nearest_texture_promoted_first() {
    let (_gpu, mut manager) = start(StreamingConfig {
        staging_buffer_count: 1,
        ..StreamingConfig::default()
    });
    let far = manager.register_dynamic(texture("far", 16), None).unwrap();
    let near = manager.register_dynamic(texture("near", 16), None).unwrap();

    let report = manager.update(secs(0.0), &[(far, 40.0), (near, 2.0)]).unwrap();
    assert_eq!(report.promoted, vec![near]);
    assert_eq!(manager.upload_state(far), Some(UploadState::MarkedForUpload));
}

#[test]
fn test_budget_pressure_routes_to_fallback() {
    let one_texture = texture("sizing", 32).descriptor().size_bytes();
    let (_gpu, mut manager) = start(StreamingConfig {
        resident_budget_bytes: Some(one_texture),
        fallback_retry: FallbackRetryPolicy::Manual,
        ..StreamingConfig::default()
    });
    let grey = manager
        .create_static(&MipChain::solid("grey", 4, Rgba8::new(128, 128, 128, 255)))
        .unwrap();
    let a = manager.register_dynamic(texture("a", 32), Some(grey)).unwrap();
    let b = manager.register_dynamic(texture("b", 32), Some(grey)).unwrap();

    let report = manager.update(secs(0.0), &[(a, 1.0), (b, 2.0)]).unwrap();
    assert_eq!(report.promoted, vec![a]);
    assert_eq!(report.fallbacks, 1);
    assert_eq!(manager.upload_state(b), Some(UploadState::ForceFallback));

    let resolved = manager.resolve(b).unwrap();
    assert_eq!(resolved.texture, grey);
    assert_eq!(resolved.mip_bias, 0.0);

    // Manual policy: stays in fallback until asked.
    manager.update(secs(1.0), &[(a, 1.0), (b, 2.0)]).unwrap();
    assert_eq!(manager.upload_state(b), Some(UploadState::ForceFallback));
    assert!(manager.retry_fallback(b).unwrap());
    assert_eq!(manager.upload_state(b), Some(UploadState::Unloaded));
    assert!(!manager.retry_fallback(b).unwrap());
}

#[test]
fn test_budget_counts_pooled_storage() {
    let one_texture = texture("sizing", 32).descriptor().size_bytes();
    let (gpu, mut manager) = start(StreamingConfig {
        unload_delay_secs: 1.0,
        resident_budget_bytes: Some(one_texture),
        fallback_retry: FallbackRetryPolicy::Manual,
        ..StreamingConfig::default()
    });
    let repeat = manager.register_dynamic(texture("repeat", 32), None).unwrap();
    manager.update(secs(0.0), &[(repeat, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.tick(secs(2.0)).unwrap().evicted, vec![repeat]);
    assert_eq!(manager.stats().resident_bytes, 0);
    assert_eq!(manager.pool_stats().recycled, 1);

    // Different descriptor: the pooled storage cannot be reused, and keeping
    // it next to a new allocation would double the budget.
    let clamp = manager.register_dynamic(clamped_texture("clamp", 32), None).unwrap();
    let report = manager.update(secs(2.1), &[(clamp, 1.0)]).unwrap();
    assert_eq!(report.promoted, vec![clamp]);
    assert_eq!(report.fallbacks, 0);
    assert_eq!(manager.stats().pool_reclaims, 1);
    assert_eq!(manager.pool_stats().reclaimed, 1);

    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(clamp), Some(UploadState::Uploaded));
    wait_for_allocated_at_most(&gpu, one_texture);
    let live = gpu
        .handle()
        .call(|ctx| Ok(ctx.backend().texture_count()))
        .unwrap();
    assert_eq!(live, 1);
}

#[test]
fn test_budget_without_pooled_storage_falls_back() {
    let one_texture = texture("sizing", 32).descriptor().size_bytes();
    let (gpu, mut manager) = start(StreamingConfig {
        resident_budget_bytes: Some(one_texture),
        fallback_retry: FallbackRetryPolicy::Manual,
        ..StreamingConfig::default()
    });
    let repeat = manager.register_dynamic(texture("repeat", 32), None).unwrap();
    let clamp = manager.register_dynamic(clamped_texture("clamp", 32), None).unwrap();

    // Both resident would exceed the budget and nothing is pooled to give back.
    let report = manager.update(secs(0.0), &[(repeat, 1.0), (clamp, 2.0)]).unwrap();
    assert_eq!(report.promoted, vec![repeat]);
    assert_eq!(report.fallbacks, 1);
    assert_eq!(manager.upload_state(clamp), Some(UploadState::ForceFallback));
    assert_eq!(manager.stats().pool_reclaims, 0);
    assert!(manager.wait_idle(IDLE));
    assert_eq!(allocations(&gpu), 1);
}

#[test]
fn test_fallback_retried_after_delay() {
    let (gpu, mut manager) = start(StreamingConfig {
        fallback_retry: FallbackRetryPolicy::AfterDelay { secs: 1.0 },
        ..StreamingConfig::default()
    });
    let grey = manager
        .create_static(&MipChain::solid("grey", 4, Rgba8::new(128, 128, 128, 255)))
        .unwrap();
    let id = manager.register_dynamic(texture("late", 32), Some(grey)).unwrap();
    gpu.handle()
        .call(|ctx| {
            ctx.backend_mut().fail_next_allocations(1);
            Ok(())
        })
        .unwrap();

    let report = manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert_eq!(report.fallbacks, 1);
    assert_eq!(manager.upload_state(id), Some(UploadState::ForceFallback));

    let report = manager.update(secs(0.5), &[(id, 1.0)]).unwrap();
    assert_eq!(report.retried, 0);
    assert_eq!(manager.upload_state(id), Some(UploadState::ForceFallback));
    assert_eq!(manager.resolve(id).unwrap().texture, grey);

    // Retried to `Unloaded`, re-marked and promoted within the same tick.
    let report = manager.update(secs(1.0), &[(id, 1.0)]).unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.marked, 1);
    assert_eq!(report.promoted, vec![id]);
    assert_eq!(manager.stats().fallback_retries, 1);

    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(id), Some(UploadState::Uploaded));
    assert_eq!(manager.resolve(id).unwrap().texture, id);
}

#[test]
fn test_retried_texture_no_longer_used_stays_unloaded() {
    let (gpu, mut manager) = start(StreamingConfig {
        unload_delay_secs: 1.0,
        fallback_retry: FallbackRetryPolicy::AfterDelay { secs: 2.0 },
        ..StreamingConfig::default()
    });
    let id = manager.register_dynamic(texture("gone", 16), None).unwrap();
    gpu.handle()
        .call(|ctx| {
            ctx.backend_mut().fail_next_allocations(1);
            Ok(())
        })
        .unwrap();

    manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert_eq!(manager.upload_state(id), Some(UploadState::ForceFallback));

    let report = manager.tick(secs(3.0)).unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.marked, 0);
    assert_eq!(manager.upload_state(id), Some(UploadState::Unloaded));
}

#[test]
fn test_impossible_descriptor_is_rejected() {
    let (gpu, mut manager) = start(StreamingConfig::default());
    let base = TextureDescriptor::new_2d(32, 32, PixelFormat::Rgba8);

    let too_deep = Arc::new(Misdescribed(TextureDescriptor { mip_levels: 40, ..base }));
    assert!(matches!(
        manager.register_dynamic(Arc::clone(&too_deep) as Arc<dyn TextureSource>, None),
        Err(RenderError::InvalidDescriptor { .. })
    ));
    assert!(matches!(
        manager.create_static(too_deep.as_ref()),
        Err(RenderError::InvalidDescriptor { .. })
    ));

    let no_mips = Arc::new(Misdescribed(TextureDescriptor { mip_levels: 0, ..base }));
    assert!(matches!(
        manager.register_dynamic(no_mips, None),
        Err(RenderError::InvalidDescriptor { .. })
    ));

    let empty = Arc::new(Misdescribed(TextureDescriptor { width: 0, ..base }));
    assert!(matches!(
        manager.register_dynamic(empty, None),
        Err(RenderError::InvalidDescriptor { .. })
    ));

    assert!(manager.is_empty());
    assert_eq!(allocations(&gpu), 0);
}

#[test]
fn test_allocation_failure_falls_back_then_retries() {
    let (gpu, mut manager) = start(StreamingConfig {
        fallback_retry: FallbackRetryPolicy::AfterTicks { ticks: 2 },
        ..StreamingConfig::default()
    });
    let grey = manager
        .create_static(&MipChain::solid("grey", 4, Rgba8::new(128, 128, 128, 255)))
        .unwrap();
    let id = manager.register_dynamic(texture("flaky", 32), Some(grey)).unwrap();

    gpu.handle()
        .call(|ctx| {
            ctx.backend_mut().fail_next_allocations(1);
            Ok(())
        })
        .unwrap();

    let report = manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert_eq!(report.fallbacks, 1);
    assert_eq!(manager.upload_state(id), Some(UploadState::ForceFallback));
    assert_eq!(manager.resolve(id).unwrap().texture, grey);
    assert_eq!(manager.stats().allocation_failures, 1);

    let report = manager.update(secs(0.1), &[(id, 1.0)]).unwrap();
    assert_eq!(report.retried, 0);

    let report = manager.update(secs(0.2), &[(id, 1.0)]).unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(report.promoted, vec![id]);
    assert!(manager.wait_idle(IDLE));
    assert_eq!(manager.upload_state(id), Some(UploadState::Uploaded));
    assert_eq!(manager.resolve(id).unwrap().texture, id);
}

#[test]
fn test_upload_failure_releases_storage() {
    let (gpu, mut manager) = start(StreamingConfig {
        fallback_retry: FallbackRetryPolicy::Manual,
        ..StreamingConfig::default()
    });
    let id = manager.register_dynamic(texture("broken", 16), None).unwrap();
    gpu.handle()
        .call(|ctx| {
            ctx.backend_mut().set_fail_uploads(true);
            Ok(())
        })
        .unwrap();

    manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));

    assert_eq!(manager.upload_state(id), Some(UploadState::ForceFallback));
    assert_eq!(manager.backing(id), None);
    assert_eq!(manager.resolve(id), None);
    let stats = manager.stats();
    assert_eq!(stats.upload_failures, 1);
    assert_eq!(stats.resident_bytes, 0);
    assert_eq!(manager.pool_stats().recycled, 1);
}

#[test]
fn test_fallback_cycle_resolves_to_nothing() {
    let (_gpu, mut manager) = start(StreamingConfig::default());
    let a = manager.register_dynamic(texture("a", 8), None).unwrap();
    let b = manager.register_dynamic(texture("b", 8), Some(a)).unwrap();
    manager.set_fallback(a, Some(b)).unwrap();

    assert_eq!(manager.resolve(a), None);
    assert_eq!(manager.resolve(b), None);
    assert!(manager.set_fallback(a, Some(TextureId(999))).is_err());
}

#[test]
fn test_shutdown_frees_every_texture() {
    let (gpu, mut manager) = start(StreamingConfig::default());
    manager
        .create_static(&MipChain::solid("grey", 4, Rgba8::default()))
        .unwrap();
    let id = manager.register_dynamic(texture("t", 16), None).unwrap();
    manager.update(secs(0.0), &[(id, 1.0)]).unwrap();
    assert!(manager.wait_idle(IDLE));

    manager.shutdown();
    assert!(manager.is_empty());
    assert!(manager.tick(secs(1.0)).is_err());

    // Deletes are posted; the next pump tick runs them.
    let handle = gpu.handle();
    let deadline = std::time::Instant::now() + IDLE;
    loop {
        let live = handle.call(|ctx| Ok(ctx.backend().texture_count())).unwrap();
        if live == 0 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "{live} textures leaked");
        std::thread::sleep(Duration::from_millis(1));
    }
}

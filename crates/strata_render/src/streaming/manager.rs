//! # Texture Manager
//!
//! Owns every texture handle and drives residency once per extraction tick.
//!
//! ```text
//!   record_usage(visible)             tick(now)
//!          │                             │
//!          ▼                             ▼
//!   ┌──────────────┐   1. retry   ForceFallback ──► Unloaded      (policy)
//!   │ UsageTracker │   2. demote  Uploaded ──► Unloaded           (unloadable, storage pooled)
//!   └──────────────┘   3. mark    Unloaded ──► MarkedForUpload    (used, not unloadable)
//!                      4. promote MarkedForUpload ──► Uploading   (pool / allocate / defer)
//!                      5. decay   mip bias
//! ```
//!
//! At most `staging_buffer_count` textures are `Uploading` at once; the
//! upload workers move them to `Uploaded` one mip at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{FallbackRetryPolicy, StreamingConfig};
use crate::error::{RenderError, RenderResult};
use crate::gpu::{GpuBackend, GpuTextureId, GpuThreadHandle, MipRegion};
use crate::streaming::descriptor::TextureDescriptor;
use crate::streaming::handle::{DynamicTexture, FallbackMark, StaticTexture, TextureHandle, TextureId};
use crate::streaming::pool::{Admission, PoolStats, TexturePool};
use crate::streaming::source::TextureSource;
use crate::streaming::stats::StreamingStats;
use crate::streaming::transfer::TransferBufferPool;
use crate::streaming::upload_queue::{UploadQueue, UploadTask};
use crate::streaming::upload_state::UploadState;
use crate::streaming::usage::{EvictionPolicy, UsageTracker};
use crate::streaming::workers::UploadWorkers;

/// What the upload workers need to stream one mip.
pub(crate) struct UploadJob {
    pub source: Arc<dyn TextureSource>,
    pub descriptor: TextureDescriptor,
    pub backing: GpuTextureId,
}

/// Answer to a worker that popped a task.
pub(crate) enum BeginUpload {
    Run(UploadJob),
    /// Stale or unregistered; `delete` is storage the worker must free.
    Skip { delete: Option<GpuTextureId> },
}

/// Result of a finished mip.
#[derive(Default)]
pub(crate) struct UploadOutcome {
    pub next: Option<UploadTask>,
    pub delete: Option<GpuTextureId>,
}

/// State shared between the manager and the upload workers.
pub(crate) struct StreamingShared {
    pub registry: Mutex<HashMap<TextureId, TextureHandle>>,
    pub usage: UsageTracker,
    pub pool: TexturePool,
    pub queue: UploadQueue,
    pub transfer: TransferBufferPool,
    pub stats: Mutex<StreamingStats>,
    /// Cycle and time of the last manager tick; stamps fallbacks raised by workers.
    clock: Mutex<FallbackMark>,
}

impl StreamingShared {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            usage: UsageTracker::new(),
            pool: TexturePool::new(config.pool_capacity_per_descriptor),
            queue: UploadQueue::new(),
            transfer: TransferBufferPool::new(config.staging_buffer_count, config.staging_buffer_size),
            stats: Mutex::new(StreamingStats::default()),
            clock: Mutex::new(FallbackMark {
                cycle: 0,
                at: Duration::ZERO,
            }),
        }
    }

    /// Detaches storage from a handle: back to the pool, or `Some(id)` if
    /// the pool is full and the caller must delete it.
    pub fn release_backing(&self, descriptor: &TextureDescriptor, texture: GpuTextureId) -> Option<GpuTextureId> {
        {
            let mut stats = self.stats.lock();
            stats.resident_bytes = stats.resident_bytes.saturating_sub(descriptor.size_bytes());
        }
        self.pool.release(descriptor, texture).err()
    }

    /// Drops a retired handle, returning storage to free.
    fn drop_retired(&self, registry: &mut HashMap<TextureId, TextureHandle>, texture: TextureId) -> Option<GpuTextureId> {
        let Some(TextureHandle::Dynamic(tex)) = registry.remove(&texture) else {
            return None;
        };
        debug!(%texture, "unregistered texture dropped after its upload task");
        let backing = tex.backing?;
        self.release_backing(&tex.descriptor, backing)
    }

    pub fn begin_upload(&self, task: UploadTask) -> BeginUpload {
        let mut registry = self.registry.lock();
        let Some(TextureHandle::Dynamic(tex)) = registry.get(&task.texture) else {
            return BeginUpload::Skip { delete: None };
        };
        if tex.retired {
            let delete = self.drop_retired(&mut registry, task.texture);
            return BeginUpload::Skip { delete };
        }
        match (tex.state, tex.backing) {
            (UploadState::Uploading { mip_level }, Some(backing)) if mip_level == task.mip_level => {
                BeginUpload::Run(UploadJob {
                    source: Arc::clone(&tex.source),
                    descriptor: tex.descriptor,
                    backing,
                })
            }
            _ => BeginUpload::Skip { delete: None },
        }
    }

    pub fn complete_upload(&self, task: UploadTask, result: RenderResult<u64>) -> UploadOutcome {
        let mut registry = self.registry.lock();
        let retired = match registry.get(&task.texture) {
            Some(TextureHandle::Dynamic(tex)) => tex.retired,
            _ => return UploadOutcome::default(),
        };
        if retired {
            return UploadOutcome {
                next: None,
                delete: self.drop_retired(&mut registry, task.texture),
            };
        }
        let Some(tex) = registry.get_mut(&task.texture).and_then(TextureHandle::as_dynamic_mut) else {
            return UploadOutcome::default();
        };

        match result {
            Ok(bands) => {
                let level = task.mip_level;
                let next_state = if level == 0 {
                    UploadState::Uploaded
                } else {
                    UploadState::Uploading { mip_level: level - 1 }
                };
                if let Err(e) = tex.transition(next_state) {
                    warn!(texture = %task.texture, error = %e, "mip landed in an unexpected state");
                    return UploadOutcome::default();
                }

                let mut stats = self.stats.lock();
                stats.mips_uploaded += 1;
                stats.bands_uploaded += bands;
                if level == 0 {
                    stats.textures_completed += 1;
                    info!(texture = %task.texture, name = tex.name(), "texture fully resident");
                    UploadOutcome::default()
                } else {
                    debug!(texture = %task.texture, level, "mip landed");
                    UploadOutcome {
                        next: Some(UploadTask {
                            texture: task.texture,
                            mip_level: level - 1,
                        }),
                        delete: None,
                    }
                }
            }
            Err(e) => {
                warn!(
                    texture = %task.texture,
                    name = tex.name(),
                    level = task.mip_level,
                    error = %e,
                    "mip upload failed; rendering through fallback"
                );
                let backing = tex.backing.take();
                let descriptor = tex.descriptor;
                enter_fallback(tex, *self.clock.lock());
                {
                    let mut stats = self.stats.lock();
                    stats.upload_failures += 1;
                    stats.fallbacks += 1;
                }
                UploadOutcome {
                    next: None,
                    delete: backing.and_then(|id| self.release_backing(&descriptor, id)),
                }
            }
        }
    }
}

fn enter_fallback(tex: &mut DynamicTexture, mark: FallbackMark) {
    if tex.transition(UploadState::ForceFallback).is_ok() {
        tex.fallback_since = Some(mark);
    }
    tex.mip_bias = tex.descriptor.mip_levels as f32;
}

/// What one [`TextureManager::tick`] changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Extraction cycle of this tick.
    pub cycle: u64,
    /// Textures moved to `ForceFallback -> Unloaded`.
    pub retried: usize,
    /// Textures moved to `MarkedForUpload`.
    pub marked: usize,
    /// Textures that got backing storage and started uploading.
    pub promoted: Vec<TextureId>,
    /// Promotions deferred by pool capacity.
    pub deferred: usize,
    /// Promotions refused (budget or allocation failure).
    pub fallbacks: usize,
    /// Textures demoted to `Unloaded`.
    pub evicted: Vec<TextureId>,
}

/// What to sample for a texture id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedTexture {
    /// The texture actually sampled (the requested one or a fallback).
    pub texture: TextureId,
    /// Its backend storage.
    pub gpu: GpuTextureId,
    /// Level-of-detail bias to sample with.
    pub mip_bias: f32,
}

/// Explicit owner of all texture handles.
pub struct TextureManager<B: GpuBackend> {
    shared: Arc<StreamingShared>,
    gpu: GpuThreadHandle<B>,
    workers: UploadWorkers,
    config: StreamingConfig,
    policy: EvictionPolicy,
    next_id: u64,
    cycle: u64,
    last_tick: Option<Duration>,
    clock_origin: Instant,
    shut_down: bool,
}

impl<B: GpuBackend> TextureManager<B> {
    /// Creates a manager and starts its upload workers.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] for a bad configuration, or
    /// [`RenderError::Io`] if the workers cannot be started.
    pub fn new(gpu: GpuThreadHandle<B>, config: StreamingConfig) -> RenderResult<Self> {
        config.validate()?;
        let shared = Arc::new(StreamingShared::new(&config));
        let workers = UploadWorkers::spawn(config.upload_worker_count, Arc::clone(&shared), &gpu)?;
        let policy = EvictionPolicy {
            unload_delay: config.unload_delay(),
            unload_distance: config.unload_distance,
        };
        Ok(Self {
            shared,
            gpu,
            workers,
            config,
            policy,
            next_id: 0,
            cycle: 0,
            last_tick: None,
            clock_origin: Instant::now(),
            shut_down: false,
        })
    }

    fn allocate_id(&mut self) -> TextureId {
        self.next_id += 1;
        TextureId(self.next_id)
    }

    fn ensure_running(&self) -> RenderResult<()> {
        if self.shut_down {
            Err(RenderError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers an already-resident backend texture. It is never evicted.
    pub fn register_static(&mut self, gpu: GpuTextureId, descriptor: TextureDescriptor) -> TextureId {
        let id = self.allocate_id();
        self.shared
            .registry
            .lock()
            .insert(id, TextureHandle::Static(StaticTexture { gpu, descriptor }));
        id
    }

    /// Loads every mip of `source` and uploads it through a blocking GPU call.
    ///
    /// Sources that do not provide mips get level 0 uploaded and the rest
    /// generated by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDescriptor`], source errors, backend
    /// errors, or [`RenderError::GpuThreadGone`]. Nothing is registered on
    /// error.
    pub fn create_static(&mut self, source: &dyn TextureSource) -> RenderResult<TextureId> {
        self.ensure_running()?;
        let descriptor = checked_descriptor(source)?;
        let provided = if source.provides_mips() { descriptor.mip_levels } else { 1 };

        let mut levels = Vec::with_capacity(provided as usize);
        for level in 0..provided {
            let bytes = source.load_mip(level)?;
            let expected = descriptor.mip_size_bytes(level);
            if bytes.len() != expected {
                return Err(RenderError::SourceUnavailable {
                    name: source.name().to_string(),
                    level,
                    reason: format!("expected {expected} bytes, got {}", bytes.len()),
                });
            }
            levels.push(bytes);
        }
        let generate = provided < descriptor.mip_levels;

        let gpu = self.gpu.call(move |ctx| {
            let backend = ctx.backend_mut();
            let texture = backend.allocate_texture(&descriptor)?;
            let uploaded = upload_levels(backend, texture, &descriptor, &levels).and_then(|()| {
                if generate {
                    backend.generate_mipmaps(texture)
                } else {
                    Ok(())
                }
            });
            if let Err(e) = uploaded {
                backend.delete_texture(texture);
                return Err(e);
            }
            Ok(texture)
        })?;

        let id = self.register_static(gpu, descriptor);
        debug!(texture = %id, name = source.name(), "static texture created");
        Ok(id)
    }

    /// Registers a streamed texture. It starts `Unloaded` and is uploaded
    /// once extraction reports it in use.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidDescriptor`] if the source describes an
    /// impossible mip chain, [`RenderError::UnknownTexture`] for an unknown
    /// fallback and [`RenderError::SourceUnavailable`] for sources without a
    /// mip chain.
    pub fn register_dynamic(
        &mut self,
        source: Arc<dyn TextureSource>,
        fallback: Option<TextureId>,
    ) -> RenderResult<TextureId> {
        checked_descriptor(source.as_ref())?;
        if !source.provides_mips() {
            return Err(RenderError::SourceUnavailable {
                name: source.name().to_string(),
                level: 1,
                reason: "streamed textures need every mip level".into(),
            });
        }
        if let Some(fallback) = fallback {
            if !self.shared.registry.lock().contains_key(&fallback) {
                return Err(RenderError::UnknownTexture(fallback));
            }
        }

        let id = self.allocate_id();
        self.shared
            .registry
            .lock()
            .insert(id, TextureHandle::Dynamic(DynamicTexture::new(source, fallback)));
        Ok(id)
    }

    /// Changes the texture sampled while `texture` is not renderable.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownTexture`] if either id is unknown, or if
    /// `texture` is static.
    pub fn set_fallback(&mut self, texture: TextureId, fallback: Option<TextureId>) -> RenderResult<()> {
        let mut registry = self.shared.registry.lock();
        if let Some(fallback) = fallback {
            if !registry.contains_key(&fallback) {
                return Err(RenderError::UnknownTexture(fallback));
            }
        }
        let tex = registry
            .get_mut(&texture)
            .and_then(TextureHandle::as_dynamic_mut)
            .ok_or(RenderError::UnknownTexture(texture))?;
        tex.fallback = fallback;
        Ok(())
    }

    /// Removes a texture and frees its storage.
    ///
    /// A texture with an upload in flight is dropped when that upload ends.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownTexture`] if `texture` is not registered.
    pub fn unregister(&mut self, texture: TextureId) -> RenderResult<()> {
        let mut delete = None;
        {
            let mut registry = self.shared.registry.lock();
            let handle = registry
                .get_mut(&texture)
                .ok_or(RenderError::UnknownTexture(texture))?;

            let deferred = match handle.as_dynamic_mut() {
                Some(tex) if matches!(tex.state, UploadState::Uploading { .. }) => {
                    tex.retired = true;
                    true
                }
                _ => false,
            };
            if !deferred {
                match registry.remove(&texture) {
                    Some(TextureHandle::Static(s)) => delete = Some(s.gpu),
                    Some(TextureHandle::Dynamic(tex)) => {
                        delete = tex
                            .backing
                            .and_then(|backing| self.shared.release_backing(&tex.descriptor, backing));
                    }
                    None => {}
                }
            }

            for tex in registry.values_mut().filter_map(TextureHandle::as_dynamic_mut) {
                if tex.fallback == Some(texture) {
                    tex.fallback = None;
                }
            }
        }
        self.shared.usage.forget(texture);
        if let Some(gpu) = delete {
            self.post_delete(vec![gpu]);
        }
        Ok(())
    }

    // =========================================================================
    // Per-tick driving
    // =========================================================================

    /// Records the textures referenced by visible batches this cycle, with
    /// their camera distance.
    pub fn record_usage(&self, now: Duration, visible: &[(TextureId, f32)]) {
        self.shared.usage.record_batch(visible, now, self.cycle);
    }

    /// `record_usage` followed by `tick`.
    ///
    /// # Errors
    ///
    /// As [`TextureManager::tick`].
    pub fn update(&mut self, now: Duration, visible: &[(TextureId, f32)]) -> RenderResult<TickReport> {
        self.record_usage(now, visible);
        self.tick(now)
    }

    /// `update` on the manager's own monotonic clock.
    ///
    /// # Errors
    ///
    /// As [`TextureManager::tick`].
    pub fn update_now(&mut self, visible: &[(TextureId, f32)]) -> RenderResult<TickReport> {
        let now = self.clock_origin.elapsed();
        self.update(now, visible)
    }

    /// Runs one residency pass at time `now` (monotonic, caller's clock).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::GpuThreadGone`] if an allocation could not be
    /// handed to the GPU thread, or [`RenderError::ShuttingDown`] after
    /// [`TextureManager::shutdown`]. Allocation failures are not errors: the
    /// texture goes to `ForceFallback`.
    pub fn tick(&mut self, now: Duration) -> RenderResult<TickReport> {
        self.ensure_running()?;
        let cycle = self.cycle;
        *self.shared.clock.lock() = FallbackMark { cycle, at: now };
        let dt = self
            .last_tick
            .map_or(0.0, |last| now.saturating_sub(last).as_secs_f32());

        let mut report = TickReport {
            cycle,
            ..TickReport::default()
        };
        report.retried = self.apply_fallback_retries(now);
        // Evict first so storage freed this tick is available to promotions.
        report.evicted = self.demote(now);
        report.marked = self.mark_needed(now);
        self.promote(now, &mut report)?;
        self.decay_mip_bias(dt);

        self.cycle += 1;
        self.last_tick = Some(now);
        Ok(report)
    }

    fn apply_fallback_retries(&self, now: Duration) -> usize {
        let policy = self.config.fallback_retry;
        if policy == FallbackRetryPolicy::Manual {
            return 0;
        }

        let mut retried = 0;
        let mut registry = self.shared.registry.lock();
        for tex in registry.values_mut().filter_map(TextureHandle::as_dynamic_mut) {
            if tex.state != UploadState::ForceFallback {
                continue;
            }
            let Some(mark) = tex.fallback_since else {
                continue;
            };
            let due = match policy {
                FallbackRetryPolicy::Manual => false,
                FallbackRetryPolicy::AfterTicks { ticks } => self.cycle.saturating_sub(mark.cycle) >= ticks,
                FallbackRetryPolicy::AfterDelay { secs } => now.saturating_sub(mark.at).as_secs_f64() >= secs,
            };
            if due && tex.transition(UploadState::Unloaded).is_ok() {
                tex.fallback_since = None;
                retried += 1;
            }
        }
        drop(registry);

        if retried > 0 {
            self.shared.stats.lock().fallback_retries += retried as u64;
            debug!(retried, "fallback textures retried");
        }
        retried
    }

    fn mark_needed(&self, now: Duration) -> usize {
        let mut marked = 0;
        let mut registry = self.shared.registry.lock();
        for (&id, handle) in registry.iter_mut() {
            let Some(tex) = handle.as_dynamic_mut() else {
                continue;
            };
            if tex.state != UploadState::Unloaded || tex.retired {
                continue;
            }
            let Some(record) = self.shared.usage.record(id) else {
                continue;
            };
            if !self.policy.can_be_unloaded(&record, now) && tex.transition(UploadState::MarkedForUpload).is_ok() {
                marked += 1;
            }
        }
        marked
    }

    fn promote(&self, now: Duration, report: &mut TickReport) -> RenderResult<()> {
        let (mut candidates, mut uploading) = {
            let registry = self.shared.registry.lock();
            let uploading = registry
                .values()
                .filter_map(TextureHandle::as_dynamic)
                .filter(|tex| matches!(tex.state, UploadState::Uploading { .. }))
                .count();
            let candidates: Vec<(TextureId, TextureDescriptor, f32)> = registry
                .iter()
                .filter_map(|(&id, handle)| {
                    let tex = handle.as_dynamic()?;
                    if tex.state != UploadState::MarkedForUpload || tex.retired {
                        return None;
                    }
                    let record = self.shared.usage.record(id)?;
                    if self.policy.can_be_unloaded(&record, now) {
                        return None;
                    }
                    Some((id, tex.descriptor, record.recorded_distance))
                })
                .collect();
            (candidates, uploading)
        };
        // Nearest first; id breaks ties so promotion order is deterministic.
        candidates.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));

        for (id, descriptor, _) in candidates {
            if uploading >= self.config.staging_buffer_count {
                break;
            }

            let size = descriptor.size_bytes();
            let backing = match self.shared.pool.admit(&descriptor) {
                Admission::Reused(gpu) => {
                    self.shared.stats.lock().pool_hits += 1;
                    debug!(texture = %id, %gpu, "pool hit");
                    gpu
                }
                Admission::Allocate => {
                    self.shared.stats.lock().pool_misses += 1;
                    if !self.make_room(id, &descriptor) {
                        self.shared.pool.cancel_allocation(&descriptor);
                        self.force_fallback(id, now);
                        report.fallbacks += 1;
                        continue;
                    }
                    match self.gpu.call(move |ctx| ctx.backend_mut().allocate_texture(&descriptor)) {
                        Ok(gpu) => {
                            self.shared.stats.lock().allocations += 1;
                            gpu
                        }
                        Err(RenderError::GpuThreadGone) => {
                            self.shared.pool.cancel_allocation(&descriptor);
                            return Err(RenderError::GpuThreadGone);
                        }
                        Err(e) => {
                            self.shared.pool.cancel_allocation(&descriptor);
                            self.shared.stats.lock().allocation_failures += 1;
                            warn!(texture = %id, error = %e, "allocation failed; rendering through fallback");
                            self.force_fallback(id, now);
                            report.fallbacks += 1;
                            continue;
                        }
                    }
                }
                Admission::Deferred => {
                    self.shared.stats.lock().deferred_admissions += 1;
                    report.deferred += 1;
                    debug!(texture = %id, "pool at capacity; admission deferred");
                    continue;
                }
            };

            let attached = {
                let mut registry = self.shared.registry.lock();
                registry
                    .get_mut(&id)
                    .and_then(TextureHandle::as_dynamic_mut)
                    .is_some_and(|tex| {
                        let started = tex.transition(UploadState::Uploading {
                            mip_level: descriptor.coarsest_mip(),
                        });
                        if started.is_ok() {
                            tex.backing = Some(backing);
                        }
                        started.is_ok()
                    })
            };
            if !attached {
                if let Some(gpu) = self.shared.pool.release(&descriptor, backing).err() {
                    self.post_delete(vec![gpu]);
                }
                continue;
            }

            uploading += 1;
            {
                let mut stats = self.shared.stats.lock();
                stats.resident_bytes += size;
                stats.peak_concurrent_uploads = stats.peak_concurrent_uploads.max(uploading as u64);
            }
            self.shared.queue.push(UploadTask {
                texture: id,
                mip_level: descriptor.coarsest_mip(),
            });
            report.promoted.push(id);
        }
        Ok(())
    }

    /// Whether allocating `descriptor` keeps resident plus pooled storage
    /// within the budget. Pooled storage of other descriptors is deleted when
    /// that is enough to fit.
    fn make_room(&self, texture: TextureId, descriptor: &TextureDescriptor) -> bool {
        let Some(budget) = self.config.resident_budget_bytes else {
            return true;
        };
        let size = descriptor.size_bytes();
        let resident = self.shared.stats.lock().resident_bytes;
        let pooled = self.shared.pool.pooled_bytes();
        let needed = (resident + pooled + size).saturating_sub(budget);
        if needed == 0 {
            return true;
        }

        let reclaimed = self.shared.pool.reclaim(descriptor, needed);
        if reclaimed.is_empty() {
            debug!(%texture, resident, pooled, size, budget, "resident budget exceeded");
            return false;
        }
        debug!(%texture, count = reclaimed.len(), "pooled storage deleted to fit the resident budget");
        self.shared.stats.lock().pool_reclaims += reclaimed.len() as u64;
        self.post_delete(reclaimed);
        true
    }

    fn force_fallback(&self, texture: TextureId, now: Duration) {
        let mark = FallbackMark {
            cycle: self.cycle,
            at: now,
        };
        if let Some(tex) = self
            .shared
            .registry
            .lock()
            .get_mut(&texture)
            .and_then(TextureHandle::as_dynamic_mut)
        {
            enter_fallback(tex, mark);
        }
        self.shared.stats.lock().fallbacks += 1;
    }

    fn demote(&self, now: Duration) -> Vec<TextureId> {
        let mut evicted = Vec::new();
        let mut deletes = Vec::new();
        {
            let mut registry = self.shared.registry.lock();
            for (&id, handle) in registry.iter_mut() {
                let Some(tex) = handle.as_dynamic_mut() else {
                    continue;
                };
                if tex.state != UploadState::Uploaded || tex.retired {
                    continue;
                }
                if !self.shared.usage.can_be_unloaded(id, &self.policy, now) {
                    continue;
                }
                let Some(backing) = tex.backing else {
                    continue;
                };
                if tex.transition(UploadState::Unloaded).is_err() {
                    continue;
                }
                tex.backing = None;
                tex.mip_bias = tex.descriptor.mip_levels as f32;
                if let Some(gpu) = self.shared.release_backing(&tex.descriptor, backing) {
                    deletes.push(gpu);
                }
                evicted.push(id);
            }
        }

        if !evicted.is_empty() {
            self.shared.stats.lock().evictions += evicted.len() as u64;
            debug!(count = evicted.len(), "textures evicted");
        }
        if !deletes.is_empty() {
            self.post_delete(deletes);
        }
        evicted.sort_unstable();
        evicted
    }

    fn decay_mip_bias(&self, dt_secs: f32) {
        let decay = self.config.mip_bias_decay_per_sec;
        let mut registry = self.shared.registry.lock();
        for tex in registry.values_mut().filter_map(TextureHandle::as_dynamic_mut) {
            tex.update_mip_bias(dt_secs, decay);
        }
    }

    fn post_delete(&self, textures: Vec<GpuTextureId>) {
        let posted = self.gpu.post(move |ctx| {
            for texture in textures {
                ctx.backend_mut().delete_texture(texture);
            }
            Ok(())
        });
        if posted.is_err() {
            debug!("GPU thread gone; texture deletes skipped");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Resident textures that the eviction policy would unload at `now`.
    ///
    /// Pure: calling it any number of times changes nothing.
    #[must_use]
    pub fn eviction_candidates(&self, now: Duration) -> Vec<TextureId> {
        let registry = self.shared.registry.lock();
        let mut candidates: Vec<TextureId> = registry
            .iter()
            .filter(|(_, handle)| {
                handle
                    .as_dynamic()
                    .is_some_and(|tex| tex.state == UploadState::Uploaded && !tex.retired)
            })
            .map(|(&id, _)| id)
            .filter(|&id| self.shared.usage.can_be_unloaded(id, &self.policy, now))
            .collect();
        candidates.sort_unstable();
        candidates
    }

    /// What to sample for `texture`, following fallbacks while the texture
    /// is not renderable. `None` if nothing in the chain is renderable.
    #[must_use]
    pub fn resolve(&self, texture: TextureId) -> Option<ResolvedTexture> {
        let registry = self.shared.registry.lock();
        let mut current = texture;
        for _ in 0..=registry.len() {
            match registry.get(&current)? {
                TextureHandle::Static(s) => {
                    return Some(ResolvedTexture {
                        texture: current,
                        gpu: s.gpu,
                        mip_bias: 0.0,
                    });
                }
                TextureHandle::Dynamic(tex) => {
                    if tex.is_renderable() && !tex.retired {
                        if let Some(gpu) = tex.backing {
                            return Some(ResolvedTexture {
                                texture: current,
                                gpu,
                                mip_bias: tex.mip_bias,
                            });
                        }
                    }
                    current = tex.fallback?;
                }
            }
        }
        // Fallback cycle.
        None
    }

    /// Residency state of a dynamic texture.
    #[must_use]
    pub fn upload_state(&self, texture: TextureId) -> Option<UploadState> {
        self.with_dynamic(texture, DynamicTexture::state)
    }

    /// Current mip bias of a dynamic texture.
    #[must_use]
    pub fn mip_bias(&self, texture: TextureId) -> Option<f32> {
        self.with_dynamic(texture, DynamicTexture::mip_bias)
    }

    /// Backend storage of a texture, if resident.
    #[must_use]
    pub fn backing(&self, texture: TextureId) -> Option<GpuTextureId> {
        match self.shared.registry.lock().get(&texture)? {
            TextureHandle::Static(s) => Some(s.gpu),
            TextureHandle::Dynamic(tex) => tex.backing,
        }
    }

    /// Descriptor of a registered texture.
    #[must_use]
    pub fn descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.shared
            .registry
            .lock()
            .get(&texture)
            .map(|handle| *handle.descriptor())
    }

    fn with_dynamic<R>(&self, texture: TextureId, f: impl FnOnce(&DynamicTexture) -> R) -> Option<R> {
        self.shared
            .registry
            .lock()
            .get(&texture)
            .and_then(TextureHandle::as_dynamic)
            .map(f)
    }

    /// Moves a `ForceFallback` texture back to `Unloaded` now, regardless of
    /// the retry policy. Returns false if it was not in `ForceFallback`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::UnknownTexture`] for unknown or static ids.
    pub fn retry_fallback(&mut self, texture: TextureId) -> RenderResult<bool> {
        let mut registry = self.shared.registry.lock();
        let tex = registry
            .get_mut(&texture)
            .and_then(TextureHandle::as_dynamic_mut)
            .ok_or(RenderError::UnknownTexture(texture))?;
        if tex.state != UploadState::ForceFallback {
            return Ok(false);
        }
        tex.transition(UploadState::Unloaded)?;
        tex.fallback_since = None;
        drop(registry);
        self.shared.stats.lock().fallback_retries += 1;
        Ok(true)
    }

    /// Number of registered textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Whether no texture is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.registry.lock().is_empty()
    }

    /// Extraction cycles completed.
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Streaming configuration.
    #[must_use]
    pub const fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Streaming counters.
    #[must_use]
    pub fn stats(&self) -> StreamingStats {
        *self.shared.stats.lock()
    }

    /// Texture pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    /// Staging buffers leased right now.
    #[must_use]
    pub fn staging_in_flight(&self) -> usize {
        self.shared.transfer.in_flight()
    }

    /// Waits until no upload task is queued or running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_idle(timeout)
    }

    /// Stops the upload workers and frees every texture. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.workers.shutdown();

        let mut deletes = self.shared.pool.drain();
        {
            let mut registry = self.shared.registry.lock();
            for (_, handle) in registry.drain() {
                match handle {
                    TextureHandle::Static(s) => deletes.push(s.gpu),
                    TextureHandle::Dynamic(tex) => deletes.extend(tex.backing),
                }
            }
        }
        self.shared.stats.lock().resident_bytes = 0;
        info!(textures = deletes.len(), "texture manager shut down");
        if !deletes.is_empty() {
            self.post_delete(deletes);
        }
    }
}

impl<B: GpuBackend> Drop for TextureManager<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The source's descriptor, if it describes a texture that can exist.
fn checked_descriptor(source: &dyn TextureSource) -> RenderResult<TextureDescriptor> {
    let descriptor = source.descriptor();
    descriptor.check().map_err(|reason| RenderError::InvalidDescriptor {
        name: source.name().to_string(),
        reason,
    })?;
    Ok(descriptor)
}

/// Uploads every provided level, one full region per layer.
fn upload_levels<B: GpuBackend>(
    backend: &mut B,
    texture: GpuTextureId,
    descriptor: &TextureDescriptor,
    levels: &[Arc<[u8]>],
) -> RenderResult<()> {
    for (level, bytes) in (0u32..).zip(levels) {
        let layer_bytes = descriptor.layer_size_bytes(level);
        for layer in 0..descriptor.dimension.layer_count() {
            let start = layer as usize * layer_bytes;
            let region = MipRegion::full(descriptor, level, layer);
            backend.upload_sub_image(texture, level, region, &bytes[start..start + layer_bytes])?;
        }
    }
    Ok(())
}

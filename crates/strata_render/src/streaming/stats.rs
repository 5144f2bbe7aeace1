//! Texture streaming statistics.

/// Counters kept by the texture manager and its upload workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingStats {
    /// Promotions served from the pool.
    pub pool_hits: u64,
    /// Promotions that needed a fresh allocation.
    pub pool_misses: u64,
    /// Successful backend allocations.
    pub allocations: u64,
    /// Failed backend allocations.
    pub allocation_failures: u64,
    /// Pooled textures deleted to keep a promotion within the resident budget.
    pub pool_reclaims: u64,
    /// Promotions deferred by the per-descriptor capacity bound.
    pub deferred_admissions: u64,
    /// Resident textures demoted to `Unloaded`.
    pub evictions: u64,
    /// Mip levels fully landed.
    pub mips_uploaded: u64,
    /// Staging-buffer copies handed to the GPU thread.
    pub bands_uploaded: u64,
    /// Textures that reached `Uploaded`.
    pub textures_completed: u64,
    /// Mip uploads that failed.
    pub upload_failures: u64,
    /// Transitions into `ForceFallback`.
    pub fallbacks: u64,
    /// Transitions out of `ForceFallback`.
    pub fallback_retries: u64,
    /// Bytes of backing storage attached to dynamic textures.
    pub resident_bytes: u64,
    /// Most textures `Uploading` at the same time.
    pub peak_concurrent_uploads: u64,
}

impl StreamingStats {
    /// Fraction of promotions served without allocating.
    #[must_use]
    pub fn pool_hit_rate(&self) -> f64 {
        let total = self.pool_hits + self.pool_misses;
        if total == 0 {
            0.0
        } else {
            self.pool_hits as f64 / total as f64
        }
    }
}

//! # Texture Pool
//!
//! Descriptor-keyed recycling of evicted backing textures.
//!
//! ```text
//!   admit(desc) ──► free list has desc?  ── yes ──► Reused(id)
//!                         │ no
//!                         ▼
//!                 in use < capacity?     ── yes ──► Allocate
//!                         │ no
//!                         ▼
//!                      Deferred (retry next tick)
//! ```
//!
//! The pool stores backend ids only, never handles. It does not talk to the
//! backend; callers allocate and delete. Pooled textures still occupy GPU
//! memory, so the pool tracks their bytes for budget checks.

use std::collections::HashMap;

use parking_lot::Mutex;
use strata_core::KeyedFreeList;

use crate::gpu::GpuTextureId;
use crate::streaming::descriptor::TextureDescriptor;

/// Result of asking the pool for backing storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Recycled storage with a matching descriptor.
    Reused(GpuTextureId),
    /// Capacity reserved; the caller must allocate (or call `cancel_allocation`).
    Allocate,
    /// The descriptor is at capacity; try again later.
    Deferred,
}

/// Pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// `Reused` admissions.
    pub hits: u64,
    /// `Allocate` admissions.
    pub misses: u64,
    /// `Deferred` admissions.
    pub deferred: u64,
    /// Textures returned to the free list.
    pub recycled: u64,
    /// Textures refused because the free list was full.
    pub overflowed: u64,
    /// Pooled textures handed out for deletion to make room.
    pub reclaimed: u64,
}

struct PoolInner {
    free: KeyedFreeList<TextureDescriptor, GpuTextureId>,
    in_use: HashMap<TextureDescriptor, usize>,
    pooled_bytes: u64,
    stats: PoolStats,
}

/// Thread-safe texture pool.
pub struct TexturePool {
    inner: Mutex<PoolInner>,
    capacity_per_descriptor: usize,
}

impl TexturePool {
    /// A pool allowing `capacity_per_descriptor` textures in use, and as many
    /// pooled, per descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_per_descriptor` is zero.
    #[must_use]
    pub fn new(capacity_per_descriptor: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                free: KeyedFreeList::new(capacity_per_descriptor),
                in_use: HashMap::new(),
                pooled_bytes: 0,
                stats: PoolStats::default(),
            }),
            capacity_per_descriptor,
        }
    }

    /// Requests backing storage for `descriptor`.
    pub fn admit(&self, descriptor: &TextureDescriptor) -> Admission {
        let mut inner = self.inner.lock();
        let in_use = inner.in_use.get(descriptor).copied().unwrap_or(0);
        if in_use >= self.capacity_per_descriptor {
            inner.stats.deferred += 1;
            return Admission::Deferred;
        }

        *inner.in_use.entry(*descriptor).or_insert(0) += 1;
        if let Some(id) = inner.free.pop(descriptor) {
            inner.pooled_bytes = inner.pooled_bytes.saturating_sub(descriptor.size_bytes());
            inner.stats.hits += 1;
            Admission::Reused(id)
        } else {
            inner.stats.misses += 1;
            Admission::Allocate
        }
    }

    /// Releases the capacity reserved by an `Allocate` admission whose
    /// allocation failed.
    pub fn cancel_allocation(&self, descriptor: &TextureDescriptor) {
        let mut inner = self.inner.lock();
        Self::decrement(&mut inner.in_use, descriptor);
    }

    /// Returns storage to the pool.
    ///
    /// # Errors
    ///
    /// Gives `texture` back if the free list for `descriptor` is full; the
    /// caller must delete it.
    pub fn release(&self, descriptor: &TextureDescriptor, texture: GpuTextureId) -> Result<(), GpuTextureId> {
        let mut inner = self.inner.lock();
        Self::decrement(&mut inner.in_use, descriptor);
        match inner.free.push(*descriptor, texture) {
            Ok(()) => {
                inner.pooled_bytes += descriptor.size_bytes();
                inner.stats.recycled += 1;
                Ok(())
            }
            Err(texture) => {
                inner.stats.overflowed += 1;
                Err(texture)
            }
        }
    }

    fn decrement(in_use: &mut HashMap<TextureDescriptor, usize>, descriptor: &TextureDescriptor) {
        if let Some(count) = in_use.get_mut(descriptor) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_use.remove(descriptor);
            }
        }
    }

    /// Takes pooled textures of descriptors other than `keep` until at least
    /// `bytes` are freed, returning them for deletion.
    ///
    /// Takes nothing when the other descriptors cannot free `bytes` between
    /// them. `keep` is spared because an admission for it would have reused
    /// its pooled storage instead of allocating.
    pub fn reclaim(&self, keep: &TextureDescriptor, bytes: u64) -> Vec<GpuTextureId> {
        let mut inner = self.inner.lock();
        let kept_bytes = inner.free.len_for(keep) as u64 * keep.size_bytes();
        if inner.pooled_bytes.saturating_sub(kept_bytes) < bytes {
            return Vec::new();
        }

        let mut freed = 0;
        let mut taken = Vec::new();
        while freed < bytes {
            let Some((descriptor, id)) = inner.free.pop_matching(|d| d != keep) else {
                break;
            };
            let size = descriptor.size_bytes();
            inner.pooled_bytes = inner.pooled_bytes.saturating_sub(size);
            freed += size;
            taken.push(id);
        }
        inner.stats.reclaimed += taken.len() as u64;
        taken
    }

    /// Empties the free list, returning every pooled texture for deletion.
    pub fn drain(&self) -> Vec<GpuTextureId> {
        let mut inner = self.inner.lock();
        inner.pooled_bytes = 0;
        inner.free.drain().into_iter().map(|(_, id)| id).collect()
    }

    /// Textures currently checked out for `descriptor`.
    #[must_use]
    pub fn in_use(&self, descriptor: &TextureDescriptor) -> usize {
        self.inner.lock().in_use.get(descriptor).copied().unwrap_or(0)
    }

    /// Textures waiting in the free list for `descriptor`.
    #[must_use]
    pub fn pooled(&self, descriptor: &TextureDescriptor) -> usize {
        self.inner.lock().free.len_for(descriptor)
    }

    /// Textures waiting in the free list overall.
    #[must_use]
    pub fn pooled_total(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Bytes of GPU storage held by the free list.
    #[must_use]
    pub fn pooled_bytes(&self) -> u64 {
        self.inner.lock().pooled_bytes
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats
    }
}

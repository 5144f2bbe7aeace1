//! # Headless Backend
//!
//! In-memory [`GpuBackend`] with deterministic fences. Used by tools that
//! run the pipeline without a window and by the test suites.
//!
//! Every call is appended to an operation log, so ordering properties
//! (coarse-to-fine uploads, one allocation per reused texture) can be
//! asserted after the fact.

use std::collections::HashMap;

use crate::error::{RenderError, RenderResult};
use crate::gpu::backend::{FenceId, GpuBackend, GpuTextureId, MipRegion};
use crate::streaming::TextureDescriptor;

/// One logged backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendOp {
    /// `allocate_texture` succeeded.
    Allocate {
        /// New texture.
        texture: GpuTextureId,
        /// Bytes reserved.
        bytes: u64,
    },
    /// `upload_sub_image` succeeded.
    Upload {
        /// Target texture.
        texture: GpuTextureId,
        /// Mip level.
        level: u32,
        /// Target region.
        region: MipRegion,
        /// Bytes copied.
        len: usize,
    },
    /// `generate_mipmaps` succeeded.
    GenerateMipmaps {
        /// Target texture.
        texture: GpuTextureId,
    },
    /// `delete_texture` on a live texture.
    Delete {
        /// Freed texture.
        texture: GpuTextureId,
    },
    /// `create_fence`.
    CreateFence {
        /// New fence.
        fence: FenceId,
    },
    /// `delete_fence`.
    DeleteFence {
        /// Released fence.
        fence: FenceId,
    },
    /// `submit_frame` succeeded.
    Submit {
        /// Submitted cycle.
        cycle: u64,
    },
}

#[derive(Debug)]
struct HeadlessTexture {
    descriptor: TextureDescriptor,
    bytes: u64,
}

/// Deterministic in-memory backend.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_texture: u32,
    next_fence: u64,
    textures: HashMap<GpuTextureId, HeadlessTexture>,
    /// Remaining unsignaled polls per live fence.
    fences: HashMap<FenceId, u32>,
    fence_latency: u32,
    memory_limit: Option<u64>,
    allocated_bytes: u64,
    failing_allocations: u32,
    fail_uploads: bool,
    fail_submits: bool,
    ops: Vec<BackendOp>,
}

impl HeadlessBackend {
    /// A backend whose fences signal on the first poll and with unlimited memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fences report unsignaled for `polls` polls before signaling.
    #[must_use]
    pub fn with_fence_latency(mut self, polls: u32) -> Self {
        self.fence_latency = polls;
        self
    }

    /// Allocations beyond `bytes` of live texture memory fail with `OutOfMemory`.
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// The next `count` allocations fail with a backend error.
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.failing_allocations = count;
    }

    /// Makes every upload fail (or succeed again).
    pub fn set_fail_uploads(&mut self, fail: bool) {
        self.fail_uploads = fail;
    }

    /// Makes every frame submission fail (or succeed again).
    pub fn set_fail_submits(&mut self, fail: bool) {
        self.fail_submits = fail;
    }

    /// Every successful call so far, in order.
    #[must_use]
    pub fn ops(&self) -> &[BackendOp] {
        &self.ops
    }

    /// Number of successful allocations so far.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, BackendOp::Allocate { .. }))
            .count()
    }

    /// Number of live textures.
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Bytes held by live textures.
    #[must_use]
    pub const fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    /// Number of fences created and not yet deleted.
    #[must_use]
    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    /// Descriptor of a live texture.
    #[must_use]
    pub fn descriptor_of(&self, texture: GpuTextureId) -> Option<&TextureDescriptor> {
        self.textures.get(&texture).map(|t| &t.descriptor)
    }

    /// Mip levels uploaded to `texture`, in call order.
    #[must_use]
    pub fn upload_levels(&self, texture: GpuTextureId) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                BackendOp::Upload { texture: t, level, .. } if *t == texture => Some(*level),
                _ => None,
            })
            .collect()
    }
}

impl GpuBackend for HeadlessBackend {
    fn allocate_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTextureId> {
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            return Err(RenderError::Backend {
                op: "allocate_texture",
                reason: "injected failure".into(),
            });
        }

        let bytes = descriptor.size_bytes();
        if let Some(limit) = self.memory_limit {
            let available = limit.saturating_sub(self.allocated_bytes);
            if bytes > available {
                return Err(RenderError::OutOfMemory {
                    requested: bytes,
                    available,
                });
            }
        }

        self.next_texture += 1;
        let texture = GpuTextureId(self.next_texture);
        self.textures.insert(
            texture,
            HeadlessTexture {
                descriptor: *descriptor,
                bytes,
            },
        );
        self.allocated_bytes += bytes;
        self.ops.push(BackendOp::Allocate { texture, bytes });
        Ok(texture)
    }

    fn upload_sub_image(
        &mut self,
        texture: GpuTextureId,
        level: u32,
        region: MipRegion,
        bytes: &[u8],
    ) -> RenderResult<()> {
        let upload_error = |reason: String| RenderError::Backend {
            op: "upload_sub_image",
            reason,
        };

        if self.fail_uploads {
            return Err(upload_error("injected failure".into()));
        }
        let Some(entry) = self.textures.get(&texture) else {
            return Err(upload_error(format!("unknown texture {texture}")));
        };
        let descriptor = &entry.descriptor;
        if level >= descriptor.mip_levels {
            return Err(upload_error(format!(
                "level {level} out of range ({} levels)",
                descriptor.mip_levels
            )));
        }
        let (width, height) = descriptor.mip_extent(level);
        if region.x + region.width > width
            || region.y + region.height > height
            || region.layer >= descriptor.dimension.layer_count()
        {
            return Err(upload_error(format!("region {region:?} outside mip {level}")));
        }
        let expected = region.size_bytes(descriptor);
        if bytes.len() != expected {
            return Err(upload_error(format!(
                "expected {expected} bytes, got {}",
                bytes.len()
            )));
        }

        self.ops.push(BackendOp::Upload {
            texture,
            level,
            region,
            len: bytes.len(),
        });
        Ok(())
    }

    fn generate_mipmaps(&mut self, texture: GpuTextureId) -> RenderResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::Backend {
                op: "generate_mipmaps",
                reason: format!("unknown texture {texture}"),
            });
        }
        self.ops.push(BackendOp::GenerateMipmaps { texture });
        Ok(())
    }

    fn delete_texture(&mut self, texture: GpuTextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            self.allocated_bytes -= entry.bytes;
            self.ops.push(BackendOp::Delete { texture });
        }
    }

    fn create_fence(&mut self) -> FenceId {
        self.next_fence += 1;
        let fence = FenceId(self.next_fence);
        self.fences.insert(fence, self.fence_latency);
        self.ops.push(BackendOp::CreateFence { fence });
        fence
    }

    fn poll_fence(&mut self, fence: FenceId) -> bool {
        let Some(remaining) = self.fences.get_mut(&fence) else {
            panic!("Polled unknown or deleted fence {fence:?}");
        };
        if *remaining == 0 {
            return true;
        }
        *remaining -= 1;
        false
    }

    fn delete_fence(&mut self, fence: FenceId) {
        if self.fences.remove(&fence).is_some() {
            self.ops.push(BackendOp::DeleteFence { fence });
        }
    }

    fn submit_frame(&mut self, cycle: u64) -> RenderResult<()> {
        if self.fail_submits {
            return Err(RenderError::Backend {
                op: "submit_frame",
                reason: "injected failure".into(),
            });
        }
        self.ops.push(BackendOp::Submit { cycle });
        Ok(())
    }
}

//! # GPU Backend Interface
//!
//! The small set of primitives the pipeline needs from a graphics API.
//! Implementations are owned by exactly one thread (see [`GpuThread`]) and
//! complete work in submission order.
//!
//! [`GpuThread`]: crate::gpu::GpuThread

use std::fmt;

use crate::error::RenderResult;
use crate::streaming::TextureDescriptor;

/// Backend-side texture name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuTextureId(pub u32);

impl fmt::Display for GpuTextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpu#{}", self.0)
    }
}

/// Backend-side fence name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceId(pub u64);

/// Sub-rectangle of one layer of one mip level, in texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MipRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Array layer or cube face.
    pub layer: u32,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

impl MipRegion {
    /// The whole of `layer` at `level`.
    #[must_use]
    pub fn full(descriptor: &TextureDescriptor, level: u32, layer: u32) -> Self {
        let (width, height) = descriptor.mip_extent(level);
        Self {
            x: 0,
            y: 0,
            layer,
            width,
            height,
        }
    }

    /// Number of bytes `descriptor`'s format needs for this region.
    #[must_use]
    pub fn size_bytes(&self, descriptor: &TextureDescriptor) -> usize {
        let block = descriptor.format.block_dim();
        let blocks_wide = self.width.div_ceil(block) as usize;
        let blocks_high = self.height.div_ceil(block) as usize;
        blocks_wide * blocks_high * descriptor.format.block_bytes() as usize
    }
}

/// Graphics API primitives used by the frame pump and the texture streamer.
///
/// Every method is called from the GPU thread only.
pub trait GpuBackend: Send + 'static {
    /// Allocates storage for every mip level of `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::OutOfMemory`](crate::RenderError::OutOfMemory)
    /// or [`RenderError::Backend`](crate::RenderError::Backend).
    fn allocate_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTextureId>;

    /// Copies `bytes` into `region` of mip `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the texture is unknown or the data does not match the region.
    fn upload_sub_image(
        &mut self,
        texture: GpuTextureId,
        level: u32,
        region: MipRegion,
        bytes: &[u8],
    ) -> RenderResult<()>;

    /// Fills every mip below level 0 from level 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the texture is unknown.
    fn generate_mipmaps(&mut self, texture: GpuTextureId) -> RenderResult<()>;

    /// Frees a texture. Unknown ids are ignored.
    fn delete_texture(&mut self, texture: GpuTextureId);

    /// Inserts a fence after all previously issued work.
    fn create_fence(&mut self) -> FenceId;

    /// Non-blocking: has all work before `fence` completed?
    fn poll_fence(&mut self, fence: FenceId) -> bool;

    /// Releases a fence.
    fn delete_fence(&mut self, fence: FenceId);

    /// Submits the commands recorded for frame `cycle`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Backend`](crate::RenderError::Backend) on submission failure.
    fn submit_frame(&mut self, cycle: u64) -> RenderResult<()>;
}

//! Texture handles as stored by the [`TextureManager`](crate::TextureManager).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RenderResult;
use crate::gpu::GpuTextureId;
use crate::streaming::descriptor::TextureDescriptor;
use crate::streaming::source::TextureSource;
use crate::streaming::upload_state::UploadState;

/// Manager-assigned texture id. Stable for the texture's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// A permanently resident texture.
#[derive(Clone, Debug)]
pub struct StaticTexture {
    pub(crate) gpu: GpuTextureId,
    pub(crate) descriptor: TextureDescriptor,
}

impl StaticTexture {
    /// Backend texture.
    #[must_use]
    pub const fn gpu(&self) -> GpuTextureId {
        self.gpu
    }

    /// Shape and format.
    #[must_use]
    pub const fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }
}

/// When a texture entered `ForceFallback`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct FallbackMark {
    pub cycle: u64,
    pub at: Duration,
}

/// A streamed texture.
pub struct DynamicTexture {
    pub(crate) descriptor: TextureDescriptor,
    pub(crate) source: Arc<dyn TextureSource>,
    pub(crate) fallback: Option<TextureId>,
    pub(crate) backing: Option<GpuTextureId>,
    pub(crate) state: UploadState,
    pub(crate) mip_bias: f32,
    pub(crate) fallback_since: Option<FallbackMark>,
    /// Unregistered while an upload task was outstanding; dropped when it finishes.
    pub(crate) retired: bool,
}

impl DynamicTexture {
    pub(crate) fn new(source: Arc<dyn TextureSource>, fallback: Option<TextureId>) -> Self {
        let descriptor = source.descriptor();
        Self {
            descriptor,
            source,
            fallback,
            backing: None,
            state: UploadState::Unloaded,
            mip_bias: descriptor.mip_levels as f32,
            fallback_since: None,
            retired: false,
        }
    }

    /// Shape and format.
    #[must_use]
    pub const fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Residency state.
    #[must_use]
    pub const fn state(&self) -> UploadState {
        self.state
    }

    /// Backing storage, if any.
    #[must_use]
    pub const fn backing(&self) -> Option<GpuTextureId> {
        self.backing
    }

    /// Texture sampled while this one is not renderable.
    #[must_use]
    pub const fn fallback(&self) -> Option<TextureId> {
        self.fallback
    }

    /// Current level-of-detail bias.
    #[must_use]
    pub const fn mip_bias(&self) -> f32 {
        self.mip_bias
    }

    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Whether at least one mip level can be sampled.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.backing.is_some()
            && self
                .state
                .finest_landed_mip()
                .is_some_and(|mip| mip < self.descriptor.mip_levels)
    }

    pub(crate) fn transition(&mut self, next: UploadState) -> RenderResult<()> {
        self.state.advance(next, self.descriptor.mip_levels)
    }

    /// Moves the bias toward full detail, never below the finest landed level.
    pub(crate) fn update_mip_bias(&mut self, dt_secs: f32, decay_per_sec: f32) {
        let levels = self.descriptor.mip_levels as f32;
        self.mip_bias = match self.state.finest_landed_mip() {
            None => levels,
            Some(floor) => (self.mip_bias - decay_per_sec * dt_secs).max(floor as f32),
        };
    }
}

impl fmt::Debug for DynamicTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTexture")
            .field("source", &self.source.name())
            .field("state", &self.state)
            .field("backing", &self.backing)
            .field("mip_bias", &self.mip_bias)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

/// A registered texture.
#[derive(Debug)]
pub enum TextureHandle {
    /// Always resident, never evicted.
    Static(StaticTexture),
    /// Streamed in and out on demand.
    Dynamic(DynamicTexture),
}

impl TextureHandle {
    /// Shape and format.
    #[must_use]
    pub const fn descriptor(&self) -> &TextureDescriptor {
        match self {
            Self::Static(t) => &t.descriptor,
            Self::Dynamic(t) => &t.descriptor,
        }
    }

    /// The dynamic texture, if this is one.
    #[must_use]
    pub const fn as_dynamic(&self) -> Option<&DynamicTexture> {
        match self {
            Self::Dynamic(t) => Some(t),
            Self::Static(_) => None,
        }
    }

    pub(crate) fn as_dynamic_mut(&mut self) -> Option<&mut DynamicTexture> {
        match self {
            Self::Dynamic(t) => Some(t),
            Self::Static(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::source::{MipChain, Rgba8};

    fn dynamic(size: u32) -> DynamicTexture {
        DynamicTexture::new(Arc::new(MipChain::solid("t", size, Rgba8::default())), None)
    }

    #[test]
    fn test_unloaded_bias_is_coarsest() {
        let mut tex = dynamic(16);
        tex.update_mip_bias(1.0, 1.0);
        assert!((tex.mip_bias() - 5.0).abs() < f32::EPSILON);
        assert!(!tex.is_renderable());
    }

    #[test]
    fn test_bias_clamped_to_landed_mip() {
        let mut tex = dynamic(16);
        tex.backing = Some(GpuTextureId(1));
        tex.transition(UploadState::MarkedForUpload).unwrap();
        tex.transition(UploadState::Uploading { mip_level: 4 }).unwrap();
        assert!(!tex.is_renderable());

        tex.transition(UploadState::Uploading { mip_level: 3 }).unwrap();
        assert!(tex.is_renderable());
        // Decay cannot go below the finest landed level (4).
        tex.update_mip_bias(100.0, 1.0);
        assert!((tex.mip_bias() - 4.0).abs() < f32::EPSILON);

        for level in (0..3).rev() {
            tex.transition(UploadState::Uploading { mip_level: level }).unwrap();
        }
        tex.transition(UploadState::Uploaded).unwrap();

        tex.update_mip_bias(1.5, 1.0);
        assert!((tex.mip_bias() - 2.5).abs() < 1e-5);
        tex.update_mip_bias(10.0, 1.0);
        assert!(tex.mip_bias().abs() < f32::EPSILON);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(TextureId(12).to_string(), "tex#12");
    }
}

//! # Texture Sources
//!
//! Where mip bytes come from. Sources are read by upload workers, never by
//! the GPU thread, so a source may decode or hit the disk.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::error::{RenderError, RenderResult};
use crate::streaming::descriptor::{PixelFormat, TextureDescriptor};

/// Provider of immutable per-mip texel data.
pub trait TextureSource: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Shape and format of the texture.
    fn descriptor(&self) -> TextureDescriptor;

    /// Texel bytes of every layer of mip `level`, tightly packed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SourceUnavailable`] if the level cannot be produced.
    fn load_mip(&self, level: u32) -> RenderResult<Arc<[u8]>>;

    /// Whether every level is provided. When false only level 0 is loaded
    /// and the backend generates the rest.
    fn provides_mips(&self) -> bool {
        true
    }
}

/// One RGBA8 texel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Creates a texel.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// An in-memory mip chain.
#[derive(Clone, Debug)]
pub struct MipChain {
    name: String,
    descriptor: TextureDescriptor,
    levels: Vec<Arc<[u8]>>,
}

impl MipChain {
    /// Builds a full RGBA8 pyramid from a level-0 image by 2x2 box filtering.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SourceUnavailable`] if `texels` does not hold
    /// `width * height` pixels.
    pub fn from_rgba8(
        name: impl Into<String>,
        width: u32,
        height: u32,
        texels: &[Rgba8],
    ) -> RenderResult<Self> {
        let name = name.into();
        if texels.len() != width as usize * height as usize || width == 0 || height == 0 {
            return Err(RenderError::SourceUnavailable {
                name,
                level: 0,
                reason: format!("expected {width}x{height} texels, got {}", texels.len()),
            });
        }

        let descriptor = TextureDescriptor::new_2d(width, height, PixelFormat::Rgba8);
        let mut levels: Vec<Arc<[u8]>> = Vec::with_capacity(descriptor.mip_levels as usize);
        let mut current = texels.to_vec();
        let (mut w, mut h) = (width, height);
        levels.push(Arc::from(bytemuck::cast_slice::<Rgba8, u8>(&current)));

        for _ in 1..descriptor.mip_levels {
            let (next, nw, nh) = downsample(&current, w, h);
            levels.push(Arc::from(bytemuck::cast_slice::<Rgba8, u8>(&next)));
            current = next;
            w = nw;
            h = nh;
        }

        Ok(Self {
            name,
            descriptor,
            levels,
        })
    }

    /// Wraps caller-provided levels.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SourceUnavailable`] naming the first level whose
    /// size does not match `descriptor`.
    pub fn from_levels(
        name: impl Into<String>,
        descriptor: TextureDescriptor,
        levels: Vec<Arc<[u8]>>,
    ) -> RenderResult<Self> {
        let name = name.into();
        if levels.len() != descriptor.mip_levels as usize {
            return Err(RenderError::SourceUnavailable {
                name,
                level: levels.len() as u32,
                reason: format!("expected {} levels, got {}", descriptor.mip_levels, levels.len()),
            });
        }
        for (level, bytes) in levels.iter().enumerate() {
            let expected = descriptor.mip_size_bytes(level as u32);
            if bytes.len() != expected {
                return Err(RenderError::SourceUnavailable {
                    name,
                    level: level as u32,
                    reason: format!("expected {expected} bytes, got {}", bytes.len()),
                });
            }
        }
        Ok(Self {
            name,
            descriptor,
            levels,
        })
    }

    /// A single-color texture with a full mip chain.
    #[must_use]
    pub fn solid(name: impl Into<String>, size: u32, color: Rgba8) -> Self {
        let size = size.max(1);
        let descriptor = TextureDescriptor::new_2d(size, size, PixelFormat::Rgba8);
        let levels: Vec<Arc<[u8]>> = (0..descriptor.mip_levels)
            .map(|level| {
                let (w, h) = descriptor.mip_extent(level);
                let texels = vec![color; w as usize * h as usize];
                Arc::from(bytemuck::cast_slice::<Rgba8, u8>(&texels))
            })
            .collect();
        Self {
            name: name.into(),
            descriptor,
            levels,
        }
    }
}

impl TextureSource for MipChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> TextureDescriptor {
        self.descriptor
    }

    fn load_mip(&self, level: u32) -> RenderResult<Arc<[u8]>> {
        self.levels
            .get(level as usize)
            .cloned()
            .ok_or_else(|| RenderError::SourceUnavailable {
                name: self.name.clone(),
                level,
                reason: format!("chain has {} levels", self.levels.len()),
            })
    }
}

/// Halves an image, averaging each 2x2 block (edge texels repeat on odd sizes).
fn downsample(src: &[Rgba8], width: u32, height: u32) -> (Vec<Rgba8>, u32, u32) {
    let nw = (width / 2).max(1);
    let nh = (height / 2).max(1);
    let at = |x: u32, y: u32| src[(y.min(height - 1) * width + x.min(width - 1)) as usize];

    let mut out = Vec::with_capacity(nw as usize * nh as usize);
    for y in 0..nh {
        for x in 0..nw {
            let quad = [
                at(2 * x, 2 * y),
                at(2 * x + 1, 2 * y),
                at(2 * x, 2 * y + 1),
                at(2 * x + 1, 2 * y + 1),
            ];
            let avg = |channel: fn(&Rgba8) -> u8| {
                let sum: u32 = quad.iter().map(|t| u32::from(channel(t))).sum();
                ((sum + 2) / 4) as u8
            };
            out.push(Rgba8 {
                r: avg(|t: &Rgba8| t.r),
                g: avg(|t: &Rgba8| t.g),
                b: avg(|t: &Rgba8| t.b),
                a: avg(|t: &Rgba8| t.a),
            });
        }
    }
    (out, nw, nh)
}

//! Texture descriptors: the shape/format tuple used as a pooling key.

/// Texture dimensionality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// Plain 2D texture.
    D2,
    /// Array of 2D layers.
    D2Array {
        /// Number of layers.
        layers: u32,
    },
    /// Six-faced cube map.
    Cube,
}

impl TextureDimension {
    /// Number of 2D layers stored per mip level.
    #[must_use]
    pub const fn layer_count(self) -> u32 {
        match self {
            Self::D2 => 1,
            Self::D2Array { layers } => layers,
            Self::Cube => 6,
        }
    }
}

/// Pixel storage format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit single channel.
    R8,
    /// 8-bit two channels.
    Rg8,
    /// 8-bit RGBA, linear.
    Rgba8,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8Srgb,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// BC1 block compression (4x4 blocks, 8 bytes).
    Bc1,
    /// BC3 block compression (4x4 blocks, 16 bytes).
    Bc3,
    /// BC7 block compression (4x4 blocks, 16 bytes).
    Bc7,
}

impl PixelFormat {
    /// Edge length of one storage block in texels (1 for uncompressed formats).
    #[must_use]
    pub const fn block_dim(self) -> u32 {
        match self {
            Self::Bc1 | Self::Bc3 | Self::Bc7 => 4,
            _ => 1,
        }
    }

    /// Bytes per storage block.
    #[must_use]
    pub const fn block_bytes(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
            Self::Rgba8 | Self::Rgba8Srgb => 4,
            Self::Rgba16Float | Self::Bc1 => 8,
            Self::Rgba32Float | Self::Bc3 | Self::Bc7 => 16,
        }
    }
}

/// Texel filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// Sampling filter configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterConfig {
    /// Minification filter.
    pub min: FilterMode,
    /// Magnification filter.
    pub mag: FilterMode,
    /// Filter between mip levels.
    pub mipmap: FilterMode,
    /// Maximum anisotropy (1 = off).
    pub anisotropy: u8,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min: FilterMode::Linear,
            mag: FilterMode::Linear,
            mipmap: FilterMode::Linear,
            anisotropy: 1,
        }
    }
}

/// Texture coordinate wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Tile.
    #[default]
    Repeat,
    /// Tile, mirroring every other repetition.
    MirroredRepeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Clamp to the border color.
    ClampToBorder,
}

/// Shape and format of a texture.
///
/// Two textures with equal descriptors can share backing storage, which is
/// why this is the key of the texture pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Width of mip 0 in texels.
    pub width: u32,
    /// Height of mip 0 in texels.
    pub height: u32,
    /// Number of mip levels (at least 1).
    pub mip_levels: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Sampling filter.
    pub filter: FilterConfig,
    /// Coordinate wrapping.
    pub wrap: WrapMode,
}

impl TextureDescriptor {
    /// A 2D texture with a full mip chain and default sampling.
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            dimension: TextureDimension::D2,
            width,
            height,
            mip_levels: full_mip_count(width, height),
            format,
            filter: FilterConfig::default(),
            wrap: WrapMode::default(),
        }
    }

    /// Overrides the mip count, clamped to the full chain.
    #[must_use]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.clamp(1, full_mip_count(self.width, self.height));
        self
    }

    /// Overrides the dimensionality.
    #[must_use]
    pub const fn with_dimension(mut self, dimension: TextureDimension) -> Self {
        self.dimension = dimension;
        self
    }

    /// Overrides the sampling filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    /// Overrides the wrap mode.
    #[must_use]
    pub const fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    /// Checks that the extent is non-zero and the mip count lies in
    /// `1..=full_mip_count(width, height)`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn check(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("extent {}x{} is empty", self.width, self.height));
        }
        if self.dimension.layer_count() == 0 {
            return Err("texture array has no layers".into());
        }
        let full = full_mip_count(self.width, self.height);
        if self.mip_levels == 0 || self.mip_levels > full {
            return Err(format!(
                "{} mip levels requested, {}x{} holds 1..={full}",
                self.mip_levels, self.width, self.height
            ));
        }
        Ok(())
    }

    /// Index of the coarsest mip level.
    #[must_use]
    pub const fn coarsest_mip(&self) -> u32 {
        self.mip_levels.saturating_sub(1)
    }

    /// Texel extent of a mip level.
    #[must_use]
    pub fn mip_extent(&self, level: u32) -> (u32, u32) {
        let width = self.width.checked_shr(level).unwrap_or(0).max(1);
        let height = self.height.checked_shr(level).unwrap_or(0).max(1);
        (width, height)
    }

    /// Bytes in one block-row of one layer at `level`.
    #[must_use]
    pub fn row_bytes(&self, level: u32) -> usize {
        let (width, _) = self.mip_extent(level);
        let blocks_wide = width.div_ceil(self.format.block_dim());
        blocks_wide as usize * self.format.block_bytes() as usize
    }

    /// Number of block-rows in one layer at `level`.
    #[must_use]
    pub fn block_rows(&self, level: u32) -> u32 {
        let (_, height) = self.mip_extent(level);
        height.div_ceil(self.format.block_dim())
    }

    /// Bytes of one layer at `level`.
    #[must_use]
    pub fn layer_size_bytes(&self, level: u32) -> usize {
        self.row_bytes(level) * self.block_rows(level) as usize
    }

    /// Bytes of every layer at `level`.
    #[must_use]
    pub fn mip_size_bytes(&self, level: u32) -> usize {
        self.layer_size_bytes(level) * self.dimension.layer_count() as usize
    }

    /// Bytes of the whole mip chain.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        (0..self.mip_levels)
            .map(|level| self.mip_size_bytes(level) as u64)
            .sum()
    }
}

/// Number of levels in a full mip chain for the given extent.
#[must_use]
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

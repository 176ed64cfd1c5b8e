/// Texture and sampler descriptors

use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::device::DeviceLimits;

/// Texture pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,
    D16_UNORM,
    D24_UNORM_S8_UINT,
    D32_FLOAT,
}

impl TextureFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::R8_UNORM => 1,
            TextureFormat::R8G8_UNORM | TextureFormat::D16_UNORM => 2,
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::R32_SFLOAT
            | TextureFormat::D24_UNORM_S8_UINT
            | TextureFormat::D32_FLOAT => 4,
            TextureFormat::R16G16B16A16_SFLOAT => 8,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// True for depth (and depth/stencil) formats
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::D16_UNORM | TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_FLOAT
        )
    }

    pub fn has_stencil(self) -> bool {
        self == TextureFormat::D24_UNORM_S8_UINT
    }
}

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED       = 1 << 0;
        const STORAGE       = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const COPY_SRC      = 1 << 4;
        const COPY_DST      = 1 << 5;
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, 1 otherwise
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Single-mip 2D texture that can be sampled and uploaded to
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        }
    }

    /// Color attachment that can also be read back
    pub fn render_target(width: u32, height: u32, format: TextureFormat) -> Self {
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_STENCIL
        } else {
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED | TextureUsage::COPY_SRC
        };
        Self { usage, ..Self::new_2d(width, height, format) }
    }

    pub fn is_3d(&self) -> bool {
        self.depth > 1
    }

    /// Size in bytes of one mip level of one array layer
    pub fn mip_size_in_bytes(&self, mip_level: u32) -> u64 {
        let extent = |size: u32| size.checked_shr(mip_level).unwrap_or(0).max(1) as u64;
        (extent(self.width) * extent(self.height))
            .saturating_mul(extent(self.depth))
            .saturating_mul(self.format.bytes_per_texel() as u64)
    }

    /// Check the descriptor against device limits
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(Error::InvalidArgument(format!(
                "texture extent {}x{}x{} must be non-zero",
                self.width, self.height, self.depth
            )));
        }
        if self.mip_levels == 0 || self.array_layers == 0 {
            return Err(Error::InvalidArgument(
                "texture mip_levels and array_layers must be non-zero".to_string(),
            ));
        }
        let max = if self.is_3d() {
            limits.max_texture_dimension_3d
        } else {
            limits.max_texture_dimension_2d
        };
        if self.width > max || self.height > max || self.depth > max {
            return Err(Error::InvalidArgument(format!(
                "texture extent {}x{}x{} exceeds device limit {}",
                self.width, self.height, self.depth, max
            )));
        }
        let max_mips = 32 - self.width.max(self.height).max(self.depth).leading_zeros();
        if self.mip_levels > max_mips {
            return Err(Error::InvalidArgument(format!(
                "texture mip_levels {} exceeds the {} levels of a {}x{} image",
                self.mip_levels, max_mips, self.width, self.height
            )));
        }
        if self.is_3d() && self.array_layers > 1 {
            return Err(Error::InvalidArgument("3D textures cannot have array layers".to_string()));
        }
        if self.array_layers > limits.max_texture_array_layers {
            return Err(Error::InvalidArgument(format!(
                "texture array_layers {} exceeds device limit {}",
                self.array_layers, limits.max_texture_array_layers
            )));
        }
        Ok(())
    }

    /// Total size in bytes of every mip of every layer, `None` on overflow
    pub fn size_in_bytes(&self) -> Option<u64> {
        let bpp = self.format.bytes_per_texel() as u64;
        let extent = |size: u32, mip: u32| size.checked_shr(mip).unwrap_or(0).max(1) as u64;
        let per_layer = (0..self.mip_levels).try_fold(0u64, |total, mip| {
            let texels = extent(self.width, mip)
                .checked_mul(extent(self.height, mip))?
                .checked_mul(extent(self.depth, mip))?;
            total.checked_add(texels.checked_mul(bpp)?)
        })?;
        per_layer.checked_mul(self.array_layers as u64)
    }
}

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Texture addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Descriptor for creating a sampler (immutable after creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub address_mode: AddressMode,
}

impl SamplerDesc {
    /// Same filter for minification and magnification
    pub fn with_filter(filter: Filter) -> Self {
        Self { mag_filter: filter, min_filter: filter, address_mode: AddressMode::default() }
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;

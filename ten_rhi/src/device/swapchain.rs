/// Swap chain descriptors
///
/// A swap chain owns a small ring of back-buffer textures. The window handle
/// comes from the windowing layer; the RHI never creates windows.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use crate::device::{DeviceLimits, TextureFormat};
use crate::error::{Error, Result};

/// Largest back-buffer ring a swap chain may hold
pub const MAX_SWAP_CHAIN_BUFFERS: u32 = 8;

/// VSync mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VSyncMode {
    /// No VSync, unlimited FPS
    Off,
    #[default]
    On,
    /// Sync when the frame rate keeps up, tear when late
    Adaptive,
    /// Lowest-latency VSync (triple buffering)
    Mailbox,
}

/// Color space of the presented image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(non_camel_case_types)]
pub enum ColorSpace {
    #[default]
    SRGB,
    HDR10_ST2084,
    HDR10_HLG,
    /// Linear extended sRGB
    scRGB,
    DisplayNative,
}

/// Presentation engine mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    Immediate,
    #[default]
    Fifo,
    FifoRelaxed,
    Mailbox,
}

impl From<VSyncMode> for PresentMode {
    fn from(mode: VSyncMode) -> Self {
        match mode {
            VSyncMode::Off => PresentMode::Immediate,
            VSyncMode::On => PresentMode::Fifo,
            VSyncMode::Adaptive => PresentMode::FifoRelaxed,
            VSyncMode::Mailbox => PresentMode::Mailbox,
        }
    }
}

/// HDR10 mastering metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HdrMetadata {
    pub primary_red: [f32; 2],
    pub primary_green: [f32; 2],
    pub primary_blue: [f32; 2],
    pub white_point: [f32; 2],
    pub min_luminance: f32,
    pub max_luminance: f32,
    pub max_content_light_level: f32,
    pub max_frame_average_light_level: f32,
}

impl Default for HdrMetadata {
    fn default() -> Self {
        Self {
            primary_red: [0.68, 0.32],
            primary_green: [0.265, 0.69],
            primary_blue: [0.15, 0.06],
            white_point: [0.3127, 0.329],
            min_luminance: 0.0,
            max_luminance: 1000.0,
            max_content_light_level: 1000.0,
            max_frame_average_light_level: 400.0,
        }
    }
}

/// Window the swap chain presents to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceTarget {
    pub window: RawWindowHandle,
    pub display: RawDisplayHandle,
}

// SAFETY: raw handles are plain identifiers; the windowing layer guarantees the
// window outlives the swap chain and the backend only uses them on surface creation.
unsafe impl Send for SurfaceTarget {}
unsafe impl Sync for SurfaceTarget {}

/// Descriptor for creating a swap chain
#[derive(Debug, Clone, PartialEq)]
pub struct SwapChainDesc {
    /// `None` creates a headless ring (software backend only)
    pub surface: Option<SurfaceTarget>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub buffer_count: u32,
    pub vsync: bool,
    pub vsync_mode: VSyncMode,
    /// `None` derives the mode from `vsync`/`vsync_mode`
    pub present_mode: Option<PresentMode>,
    pub color_space: ColorSpace,
    pub enable_hdr: bool,
    pub allow_tearing: bool,
    pub hdr_metadata: HdrMetadata,
}

impl SwapChainDesc {
    pub fn new(surface: Option<SurfaceTarget>, width: u32, height: u32) -> Self {
        Self {
            surface,
            width,
            height,
            format: TextureFormat::B8G8R8A8_SRGB,
            buffer_count: 2,
            vsync: true,
            vsync_mode: VSyncMode::On,
            present_mode: None,
            color_space: ColorSpace::SRGB,
            enable_hdr: false,
            allow_tearing: false,
            hdr_metadata: HdrMetadata::default(),
        }
    }

    /// Present mode the backend should request
    pub fn requested_present_mode(&self) -> PresentMode {
        if let Some(mode) = self.present_mode {
            return mode;
        }
        if !self.vsync {
            return PresentMode::Immediate;
        }
        PresentMode::from(self.vsync_mode)
    }

    /// Check the descriptor against device limits
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        Self::validate_extent(self.width, self.height, limits)?;
        if self.buffer_count == 0 || self.buffer_count > MAX_SWAP_CHAIN_BUFFERS {
            return Err(Error::InvalidArgument(format!(
                "swap chain buffer_count {} must be within 1..={}",
                self.buffer_count, MAX_SWAP_CHAIN_BUFFERS
            )));
        }
        if self.format.is_depth() {
            return Err(Error::InvalidArgument(format!(
                "swap chain format {:?} is a depth format",
                self.format
            )));
        }
        Ok(())
    }

    /// Back-buffer extent check shared by creation and resize
    pub fn validate_extent(width: u32, height: u32, limits: &DeviceLimits) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!(
                "swap chain extent {}x{} must be non-zero",
                width, height
            )));
        }
        let max = limits.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(Error::InvalidArgument(format!(
                "swap chain extent {}x{} exceeds device limit {}",
                width, height, max
            )));
        }
        Ok(())
    }
}

/// Current state of a swap chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainInfo {
    pub width: u32,
    pub height: u32,
    /// Index of the back buffer the next frame renders into
    pub current_index: u32,
    pub buffer_count: u32,
    pub format: TextureFormat,
    pub vsync_mode: VSyncMode,
    pub color_space: ColorSpace,
    pub hdr_enabled: bool,
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;

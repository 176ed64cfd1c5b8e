//! Unit tests for swapchain.rs

use crate::device::{
    DeviceLimits, PresentMode, SwapChainDesc, TextureFormat, VSyncMode, MAX_SWAP_CHAIN_BUFFERS,
};

fn limits() -> DeviceLimits {
    DeviceLimits {
        max_buffer_size: 1 << 20,
        max_texture_dimension_2d: 4096,
        max_texture_dimension_3d: 256,
        max_texture_array_layers: 64,
        min_uniform_buffer_offset_alignment: 256,
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_headless_desc_is_valid() {
    assert!(SwapChainDesc::new(None, 800, 600).validate(&limits()).is_ok());
}

#[test]
fn test_zero_extent_is_rejected() {
    assert!(SwapChainDesc::new(None, 0, 600).validate(&limits()).unwrap_err().is_invalid_argument());
    assert!(SwapChainDesc::new(None, 800, 0).validate(&limits()).is_err());
}

#[test]
fn test_zero_buffers_is_rejected() {
    let desc = SwapChainDesc { buffer_count: 0, ..SwapChainDesc::new(None, 8, 8) };
    assert!(desc.validate(&limits()).is_err());
}

#[test]
fn test_depth_format_is_rejected() {
    let desc = SwapChainDesc { format: TextureFormat::D32_FLOAT, ..SwapChainDesc::new(None, 8, 8) };
    assert!(desc.validate(&limits()).is_err());
}

#[test]
fn test_extent_above_texture_limit_is_rejected() {
    assert!(SwapChainDesc::new(None, 4096, 4096).validate(&limits()).is_ok());
    assert!(SwapChainDesc::new(None, 4097, 600).validate(&limits()).unwrap_err().is_invalid_argument());
    assert!(SwapChainDesc::new(None, 800, 65536).validate(&limits()).is_err());
}

#[test]
fn test_buffer_count_is_capped() {
    let desc = SwapChainDesc { buffer_count: MAX_SWAP_CHAIN_BUFFERS, ..SwapChainDesc::new(None, 8, 8) };
    assert!(desc.validate(&limits()).is_ok());
    let desc = SwapChainDesc { buffer_count: MAX_SWAP_CHAIN_BUFFERS + 1, ..SwapChainDesc::new(None, 8, 8) };
    assert!(desc.validate(&limits()).unwrap_err().is_invalid_argument());
}

#[test]
fn test_validate_extent_for_resize() {
    assert!(SwapChainDesc::validate_extent(1920, 1080, &limits()).is_ok());
    assert!(SwapChainDesc::validate_extent(0, 1080, &limits()).is_err());
    assert!(SwapChainDesc::validate_extent(65536, 1080, &limits()).is_err());
}

// ============================================================================
// PRESENT MODE SELECTION
// ============================================================================

#[test]
fn test_vsync_off_requests_immediate() {
    let desc = SwapChainDesc { vsync: false, ..SwapChainDesc::new(None, 8, 8) };
    assert_eq!(desc.requested_present_mode(), PresentMode::Immediate);
}

#[test]
fn test_vsync_mode_maps_to_present_mode() {
    let desc = SwapChainDesc { vsync_mode: VSyncMode::Mailbox, ..SwapChainDesc::new(None, 8, 8) };
    assert_eq!(desc.requested_present_mode(), PresentMode::Mailbox);

    let desc = SwapChainDesc { vsync_mode: VSyncMode::Adaptive, ..SwapChainDesc::new(None, 8, 8) };
    assert_eq!(desc.requested_present_mode(), PresentMode::FifoRelaxed);

    assert_eq!(SwapChainDesc::new(None, 8, 8).requested_present_mode(), PresentMode::Fifo);
}

#[test]
fn test_explicit_present_mode_wins() {
    let desc = SwapChainDesc {
        vsync: false,
        present_mode: Some(PresentMode::Fifo),
        ..SwapChainDesc::new(None, 8, 8)
    };
    assert_eq!(desc.requested_present_mode(), PresentMode::Fifo);
}

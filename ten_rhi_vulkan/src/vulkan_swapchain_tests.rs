//! Unit tests for swap chain sizing and usage selection (no GPU required)

use super::*;

fn caps(min_images: u32, max_images: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: min_images,
        max_image_count: max_images,
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        ..Default::default()
    }
}

// ============================================================================
// IMAGE COUNT TESTS
// ============================================================================

#[test]
fn test_image_count_raised_to_surface_minimum() {
    assert_eq!(image_count(1, &caps(2, 8, (800, 600))), 2);
}

#[test]
fn test_image_count_clamped_to_surface_maximum() {
    assert_eq!(image_count(5, &caps(2, 3, (800, 600))), 3);
}

#[test]
fn test_image_count_unbounded_maximum() {
    assert_eq!(image_count(6, &caps(2, 0, (800, 600))), 6);
}

// ============================================================================
// EXTENT TESTS
// ============================================================================

#[test]
fn test_extent_follows_surface() {
    let extent = choose_extent(1920, 1080, &caps(2, 3, (800, 600)));
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_extent_requested_when_surface_lets_us_choose() {
    let extent = choose_extent(1920, 1080, &caps(2, 3, (u32::MAX, u32::MAX)));
    assert_eq!((extent.width, extent.height), (1920, 1080));

    let clamped = choose_extent(10000, 0, &caps(2, 3, (u32::MAX, u32::MAX)));
    assert_eq!((clamped.width, clamped.height), (4096, 1));
}

// ============================================================================
// USAGE TESTS
// ============================================================================

#[test]
fn test_image_usage_limited_to_supported() {
    let usage = image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST);
    assert!(usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
    assert!(!usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    assert_eq!(texture_usage(usage), TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST);
}

#[test]
fn test_texture_usage_with_copies() {
    let usage = image_usage(vk::ImageUsageFlags::from_raw(u32::MAX));
    let expected = TextureUsage::RENDER_TARGET | TextureUsage::COPY_SRC | TextureUsage::COPY_DST;
    assert_eq!(texture_usage(usage), expected);
    assert!(!texture_usage(usage).contains(TextureUsage::SAMPLED));
}

// ============================================================================
// VSYNC TESTS
// ============================================================================

#[test]
fn test_effective_vsync() {
    let mut desc = SwapChainDesc::new(None, 800, 600);
    desc.vsync_mode = VSyncMode::Mailbox;
    assert_eq!(effective_vsync(&desc), VSyncMode::Mailbox);
    desc.vsync = false;
    assert_eq!(effective_vsync(&desc), VSyncMode::Off);
}

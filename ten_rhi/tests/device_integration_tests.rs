//! Integration tests for the Device contract
//!
//! No GPU required: runs on the software backend.
//!
//! Run with: cargo test --test device_integration_tests


use ten_rhi::rhi::device::{
    BufferDesc, BufferUsage, QueueType, RecordingState, TextureDesc, TextureFormat, Viewport,
};
use ten_rhi::rhi::software::SoftwareDevice;
use ten_rhi::rhi::{Device, Error};
use test_utils::{pattern, software_device};

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_integration_buffer_creation_by_size() {
    let device = software_device();
    for size in [1u64, 4, 256, 65536] {
        assert!(device.create_buffer(&BufferDesc::new(size, BufferUsage::VERTEX)).is_ok(), "size {}", size);
    }
    assert!(device.create_buffer(&BufferDesc::new(0, BufferUsage::VERTEX)).is_err());
}

#[test]
fn test_integration_texture_creation_by_extent() {
    let device = software_device();
    for (w, h) in [(1, 1), (64, 32), (1, 512)] {
        assert!(device.create_texture(&TextureDesc::new_2d(w, h, TextureFormat::R8G8B8A8_UNORM)).is_ok());
    }
    for (w, h) in [(0, 1), (1, 0), (0, 0)] {
        assert!(device.create_texture(&TextureDesc::new_2d(w, h, TextureFormat::R8G8B8A8_UNORM)).is_err());
    }
}

// ============================================================================
// HOST ROUND TRIP
// ============================================================================

#[test]
fn test_integration_update_read_round_trip() {
    let device = software_device();
    let data = pattern(256);
    let buffer = device.create_buffer(&BufferDesc::new(256, BufferUsage::UNIFORM)).unwrap();

    device.update_buffer(buffer, 0, &data).unwrap();

    assert_eq!(device.read_buffer(buffer, 0, 256).unwrap(), data);
}

#[test]
fn test_integration_update_buffer_slice() {
    let device = software_device();
    let buffer = device.create_buffer(&BufferDesc::new(16, BufferUsage::UNIFORM)).unwrap();
    let values = [1.0f32, 2.0, 3.0, 4.0];

    ten_rhi::rhi::device::update_buffer_slice(device.as_ref(), buffer, 0, &values).unwrap();

    let expected: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(device.read_buffer(buffer, 0, 16).unwrap(), expected);
}

// ============================================================================
// SUBMISSION
// ============================================================================

#[test]
fn test_integration_empty_list_signals_fence() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let fence = device.create_fence(false).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.end();
    queue.submit(list.as_mut(), Some(fence), None, None);

    device.wait_fence(fence).unwrap();
    assert_eq!(list.state(), RecordingState::Submitted);
}

#[test]
fn test_integration_initially_signaled_fence() {
    let device = software_device();
    let fence = device.create_fence(true).unwrap();
    device.wait_fence(fence).unwrap();
}

#[test]
fn test_integration_recording_without_begin_has_no_effect() {
    let device = SoftwareDevice::new(&Default::default()).unwrap();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.set_viewport(0, &[Viewport::from_extent(8, 8)]);
    list.draw(3, 1, 0, 0);
    list.dispatch(1, 1, 1);
    list.end_render_pass();
    queue.submit(list.as_mut(), None, None, None);

    list.begin();
    list.end();
    list.draw(3, 1, 0, 0);
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.draws, 0);
    assert_eq!(stats.dispatches, 0);
    assert_eq!(stats.skipped_commands, 0);
}

#[test]
fn test_integration_list_reuse_after_fence() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Compute, 0).unwrap();
    let fence = device.create_fence(false).unwrap();
    let mut list = device.create_command_list().unwrap();

    for _ in 0..4 {
        list.begin();
        list.end();
        queue.submit(list.as_mut(), Some(fence), None, None);
        device.wait_fence(fence).unwrap();
        device.reset_fence(fence).unwrap();
    }
    assert_eq!(list.state(), RecordingState::Submitted);
}

// ============================================================================
// HANDLES
// ============================================================================

#[test]
fn test_integration_handles_do_not_cross_devices() {
    let a = software_device();
    let b = software_device();
    let from_a = a.create_buffer(&BufferDesc::new(16, BufferUsage::UNIFORM)).unwrap();
    let from_b = b.create_buffer(&BufferDesc::new(16, BufferUsage::UNIFORM)).unwrap();
    b.update_buffer(from_b, 0, &[1; 16]).unwrap();

    assert!(matches!(b.update_buffer(from_a, 0, &[7; 16]), Err(Error::InvalidResource(_))));
    assert!(matches!(b.read_buffer(from_a, 0, 16), Err(Error::InvalidResource(_))));
    b.destroy_buffer(from_a);

    assert_eq!(b.read_buffer(from_b, 0, 16).unwrap(), vec![1; 16]);
    assert_eq!(a.read_buffer(from_a, 0, 16).unwrap(), vec![0; 16]);
}

#[test]
fn test_integration_foreign_fence_is_rejected() {
    let a = software_device();
    let b = software_device();
    let fence = a.create_fence(true).unwrap();
    b.create_fence(false).unwrap();

    assert!(b.wait_fence(fence).is_err());
    assert!(a.wait_fence(fence).is_ok());
}

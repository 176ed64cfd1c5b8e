//! Integration tests for fences, semaphores and multi-threaded recording
//!
//! Run with: cargo test --test sync_integration_tests


use std::sync::Arc;
use std::thread;
use std::time::Duration;
use ten_rhi::rhi::device::{CommandList, Device, QueueType};
use ten_rhi::rhi::software::SoftwareDevice;
use test_utils::{pattern, readback_buffer, staging_buffer};

fn device() -> Arc<SoftwareDevice> {
    Arc::new(SoftwareDevice::new(&Default::default()).unwrap())
}

// ============================================================================
// FENCES
// ============================================================================

#[test]
fn test_integration_fence_signaled_from_another_thread() {
    let device = device();
    let fence = device.create_fence(false).unwrap();

    let signaler = {
        let device = device.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            device.signal_fence(fence).unwrap();
        })
    };

    device.wait_fence(fence).unwrap();
    signaler.join().unwrap();
}

#[test]
fn test_integration_fence_per_frame() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let fences = [device.create_fence(true).unwrap(), device.create_fence(true).unwrap()];
    let mut lists: Vec<Box<dyn CommandList>> =
        (0..2).map(|_| device.create_command_list().unwrap()).collect();

    for frame in 0..6 {
        let slot = frame % 2;
        device.wait_fence(fences[slot]).unwrap();
        device.reset_fence(fences[slot]).unwrap();
        let list = &mut lists[slot];
        list.begin();
        list.end();
        queue.submit(list.as_mut(), Some(fences[slot]), None, None);
    }
    device.wait_idle().unwrap();

    assert_eq!(device.queue_stats(QueueType::Graphics).submissions, 6);
}

// ============================================================================
// SEMAPHORES
// ============================================================================

#[test]
fn test_integration_copy_then_graphics_with_semaphore() {
    let device = device();
    let copy = device.get_queue(QueueType::Copy, 0).unwrap();
    let graphics = device.get_queue(QueueType::Graphics, 0).unwrap();
    let uploaded = device.create_semaphore().unwrap();
    let fence = device.create_fence(false).unwrap();
    let data = pattern(64);
    let src = staging_buffer(device.as_ref(), &data);
    let mid = readback_buffer(device.as_ref(), 64);
    let dst = readback_buffer(device.as_ref(), 64);

    let mut upload = device.create_command_list().unwrap();
    upload.begin();
    upload.copy_buffer(src, 0, mid, 0, 64);
    upload.end();
    let mut consume = device.create_command_list().unwrap();
    consume.begin();
    consume.copy_buffer(mid, 0, dst, 0, 64);
    consume.end();

    copy.submit(upload.as_mut(), None, None, Some(uploaded));
    graphics.submit(consume.as_mut(), Some(fence), Some(uploaded), None);
    device.wait_fence(fence).unwrap();

    assert_eq!(device.read_buffer(dst, 0, 64).unwrap(), data);
}

#[test]
fn test_integration_stale_semaphore_is_ignored() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let semaphore = device.create_semaphore().unwrap();
    device.destroy_semaphore(semaphore);
    let fence = device.create_fence(false).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.end();
    queue.submit(list.as_mut(), Some(fence), Some(semaphore), None);

    device.wait_fence(fence).unwrap();
}

// ============================================================================
// MULTI-THREADED RECORDING
// ============================================================================

#[test]
fn test_integration_parallel_recording_and_submission() {
    let device = device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let workers = 4;

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let device = device.clone();
            let queue = queue.clone();
            thread::spawn(move || {
                let data = vec![i as u8 + 1; 32];
                let src = staging_buffer(device.as_ref(), &data);
                let dst = readback_buffer(device.as_ref(), 32);
                let fence = device.create_fence(false).unwrap();
                let mut list = device.create_command_list().unwrap();
                list.begin();
                list.copy_buffer(src, 0, dst, 0, 32);
                list.end();
                queue.submit(list.as_mut(), Some(fence), None, None);
                device.wait_fence(fence).unwrap();
                assert_eq!(device.read_buffer(dst, 0, 32).unwrap(), data);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = device.queue_stats(QueueType::Copy);
    assert_eq!(stats.submissions, workers);
    assert_eq!(stats.copies, workers);
}

//! Unit tests for software fences and semaphores

use super::{SoftwareFence, SoftwareSemaphore};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// FENCE
// ============================================================================

#[test]
fn test_initially_signaled_fence_does_not_block() {
    let fence = SoftwareFence::new(true);
    fence.wait();
    assert!(fence.is_signaled());
}

#[test]
fn test_fence_signal_and_reset() {
    let fence = SoftwareFence::new(false);
    assert!(!fence.is_signaled());
    fence.signal();
    assert!(fence.is_signaled());
    fence.reset();
    assert!(!fence.is_signaled());
}

#[test]
fn test_fence_wait_wakes_on_signal_from_other_thread() {
    let fence = Arc::new(SoftwareFence::new(false));
    let signaler = {
        let fence = fence.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            fence.signal();
        })
    };

    fence.wait();
    assert!(fence.is_signaled());
    signaler.join().unwrap();
}

// ============================================================================
// SEMAPHORE
// ============================================================================

#[test]
fn test_semaphore_signal_before_wait() {
    let semaphore = SoftwareSemaphore::new();
    semaphore.signal();
    semaphore.wait();
}

#[test]
fn test_semaphore_each_signal_is_consumed_once() {
    let semaphore = Arc::new(SoftwareSemaphore::new());
    semaphore.signal();
    semaphore.wait();

    let waiter = {
        let semaphore = semaphore.clone();
        thread::spawn(move || semaphore.wait())
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());

    semaphore.signal();
    waiter.join().unwrap();
}

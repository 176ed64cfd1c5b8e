/// CPU fences and semaphores of the software backend

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if another thread panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binary CPU-observable completion flag
#[derive(Debug, Default)]
pub(crate) struct SoftwareFence {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl SoftwareFence {
    pub fn new(initially_signaled: bool) -> Self {
        Self { signaled: Mutex::new(initially_signaled), cond: Condvar::new() }
    }

    /// Block until signaled
    pub fn wait(&self) {
        let mut signaled = lock(&self.signaled);
        while !*signaled {
            signaled = self.cond.wait(signaled).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn signal(&self) {
        *lock(&self.signaled) = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *lock(&self.signaled) = false;
    }

    pub fn is_signaled(&self) -> bool {
        *lock(&self.signaled)
    }
}

/// GPU-GPU ordering token between queue workers
///
/// Each signal is consumed by exactly one wait.
#[derive(Debug, Default)]
pub(crate) struct SoftwareSemaphore {
    pending: Mutex<u64>,
    cond: Condvar,
}

impl SoftwareSemaphore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *lock(&self.pending) += 1;
        self.cond.notify_one();
    }

    /// Block until a signal is available, then consume it
    pub fn wait(&self) {
        let mut pending = lock(&self.pending);
        while *pending == 0 {
            pending = self.cond.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
        *pending -= 1;
    }
}

#[cfg(test)]
#[path = "software_sync_tests.rs"]
mod tests;

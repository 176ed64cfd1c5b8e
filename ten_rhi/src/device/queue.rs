/// Queue trait - executes submitted command lists in FIFO order

use crate::device::{CommandList, FenceHandle, QueueType, SemaphoreHandle};
use crate::error::Result;

/// GPU queue
///
/// Submissions to one queue execute in submission order. Ordering across
/// queues exists only through semaphores. `submit` serializes internally, so
/// several threads may submit to the same queue.
pub trait Queue: Send + Sync {
    /// Kind of work this queue accepts
    fn queue_type(&self) -> QueueType;

    /// Submit an ended command list
    ///
    /// A list that is still recording, was never ended, belongs to another
    /// backend, or was already submitted is dropped with a warning.
    ///
    /// # Arguments
    ///
    /// * `cmd` - Command list in the `Executable` state
    /// * `signal_fence` - Signaled once all work of this submission completed
    /// * `wait_semaphore` - Work starts only after this semaphore was signaled
    /// * `signal_semaphore` - Signaled once all work of this submission completed
    fn submit(
        &self,
        cmd: &mut dyn CommandList,
        signal_fence: Option<FenceHandle>,
        wait_semaphore: Option<SemaphoreHandle>,
        signal_semaphore: Option<SemaphoreHandle>,
    );

    /// Block until every submission made so far has completed
    fn wait_idle(&self) -> Result<()>;
}

/// Vulkan queue - submits command lists to one native queue

use std::sync::{Arc, Mutex};
use ash::vk;
use ten_rhi::rhi::device::{CommandList, FenceHandle, Queue, QueueType, SemaphoreHandle};
use ten_rhi::rhi::Result;
use ten_rhi::{rhi_debug, rhi_error, rhi_warn};

use crate::vulkan::VulkanShared;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::{lock, vk_err};

const SOURCE: &str = "ten_rhi::vulkan::queue";

/// RHI queue backed by a native queue
///
/// Devices with a single queue hand out the same native queue for every
/// `QueueType`; the shared mutex serializes their submissions.
pub struct VulkanQueue {
    queue_type: QueueType,
    shared: Arc<VulkanShared>,
    queue: Arc<Mutex<vk::Queue>>,
}

impl VulkanQueue {
    pub(crate) fn new(queue_type: QueueType, shared: Arc<VulkanShared>) -> Self {
        let queue = Arc::clone(shared.ctx.queue(queue_type));
        Self { queue_type, shared, queue }
    }
}

impl Queue for VulkanQueue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn submit(
        &self,
        cmd: &mut dyn CommandList,
        signal_fence: Option<FenceHandle>,
        wait_semaphore: Option<SemaphoreHandle>,
        signal_semaphore: Option<SemaphoreHandle>,
    ) {
        let list = match cmd.as_any_mut().downcast_mut::<VulkanCommandList>() {
            Some(list) => list,
            None => {
                rhi_warn!(SOURCE, "submit ignored: command list belongs to another backend");
                return;
            }
        };
        if !Arc::ptr_eq(&list.shared, &self.shared) {
            rhi_warn!(SOURCE, "submit ignored: command list belongs to another device");
            return;
        }
        let state = list.state();
        if !list.mark_submitted() {
            rhi_warn!(SOURCE, "submit ignored: command list is {:?}, expected Executable", state);
            return;
        }

        let (fence, wait, signal) = {
            let resources = lock(&self.shared.resources);
            let fence = signal_fence.and_then(|handle| {
                let fence = resources.fences.get(handle).copied();
                if fence.is_none() {
                    rhi_warn!(SOURCE, "submit: stale fence {:?} will not be signaled", handle);
                }
                fence
            });
            let semaphore = |handle: Option<SemaphoreHandle>| {
                handle.and_then(|handle| {
                    let semaphore = resources.semaphores.get(handle).copied();
                    if semaphore.is_none() {
                        rhi_warn!(SOURCE, "submit: stale semaphore {:?} ignored", handle);
                    }
                    semaphore
                })
            };
            (fence, semaphore(wait_semaphore), semaphore(signal_semaphore))
        };

        let device = &self.shared.ctx.device;
        if let Some(fence) = fence {
            // A signaled fence cannot be submitted; the submission re-signals it
            if let Ok(true) = unsafe { device.get_fence_status(fence) } {
                rhi_debug!(SOURCE, "submit: resetting signaled fence before reuse");
                if let Err(e) = unsafe { device.reset_fences(&[fence]) } {
                    rhi_error!(SOURCE, "submit: failed to reset fence: {:?}", e);
                }
            }
        }

        let command_buffers = [list.command_buffer];
        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        let queue = lock(&self.queue);
        let submitted = unsafe { device.queue_submit(*queue, &[submit_info], fence.unwrap_or_default()) };
        if let Err(e) = submitted {
            rhi_error!(SOURCE, "{:?} queue submission failed: {:?}", self.queue_type, e);
            // Nothing reached the queue: the list stays resubmittable and the
            // fence still completes so `wait_fence` returns
            list.cancel_submit();
            if let Some(fence) = fence {
                if let Err(e) = unsafe { device.queue_submit(*queue, &[], fence) } {
                    rhi_error!(SOURCE, "submit: failed to signal fence after error: {:?}", e);
                }
            }
        }
    }

    fn wait_idle(&self) -> Result<()> {
        let queue = lock(&self.queue);
        unsafe { self.shared.ctx.device.queue_wait_idle(*queue) }.map_err(|e| vk_err("Failed to wait for queue", e))
    }
}

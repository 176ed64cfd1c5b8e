/*!
# TenEngine RHI - Vulkan Backend

Vulkan implementation of the `ten_rhi` contract, built on `ash` for the API
bindings and `gpu-allocator` for memory management.

The backend is added to an application-owned [`BackendRegistry`] with
[`register`]; devices are then created through the registry like any other
backend.

```no_run
use ten_rhi::rhi::{Backend, BackendRegistry, RhiConfig};

let mut registry = BackendRegistry::new();
ten_rhi_vulkan::register(&mut registry);
let device = registry.create_device(Backend::Vulkan, &RhiConfig::default())?;
# Ok::<(), ten_rhi::rhi::Error>(())
```

## Notes

- Textures start in the `Common` state (`GENERAL` layout); every other
  state is reached through `CommandList::resource_barrier`.
- Graphics pipelines are built per render pass and subpass they are used
  in, the first time a draw needs them.
- Swap chain back buffers are acquired eagerly; `present` waits for the
  graphics queue before presenting.
*/

mod vulkan;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_context;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;
mod vulkan_descriptor_set;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_queue;
mod vulkan_render_pass;
mod vulkan_resources;
mod vulkan_swapchain;
mod vulkan_texture;

use ten_rhi::rhi::device::Device;
use ten_rhi::rhi::{Backend, BackendRegistry};

pub use vulkan::VulkanDevice;
pub use vulkan_command_list::VulkanCommandList;
pub use vulkan_queue::VulkanQueue;

// Validation statistics (only with the `vulkan-validation` feature)
#[cfg(feature = "vulkan-validation")]
pub use vulkan_debug::{reset_validation_stats, validation_stats, ValidationStats};

/// Register the Vulkan backend with a registry
pub fn register(registry: &mut BackendRegistry) {
    registry.register(Backend::Vulkan, |config| {
        VulkanDevice::new(config).map(|device| Box::new(device) as Box<dyn Device>)
    });
}

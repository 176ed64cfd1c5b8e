/// Device trait - root factory of every RHI object

use std::sync::Arc;
use crate::device::{
    Backend, BufferDesc, BufferHandle, CommandList, ComputePsoDesc, DescriptorResource,
    DescriptorSetHandle, DescriptorSetLayoutDesc, DescriptorSetLayoutHandle, DescriptorWrite,
    FenceHandle, GraphicsPsoDesc, PsoHandle, Queue, QueueType, RenderPassDesc,
    RenderPassHandle, SamplerDesc, SamplerHandle, SemaphoreHandle, SwapChainDesc,
    SwapChainHandle, SwapChainInfo, TextureDesc, TextureHandle, VSyncMode,
};
use crate::error::Result;

/// Optional capabilities of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    /// Hardware ray tracing; when false the ray tracing commands are no-ops
    pub ray_tracing: bool,
    pub occlusion_queries: bool,
}

/// Numeric limits of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_buffer_size: u64,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_array_layers: u32,
    pub min_uniform_buffer_offset_alignment: u64,
}

/// Number of occlusion query slots every device provides
pub const OCCLUSION_QUERY_COUNT: u32 = 64;

/// Main device interface
///
/// All objects created by a device are named by generation-checked handles
/// and become invalid when the device is dropped. Destroying an object the
/// GPU may still use is the caller's responsibility: wait the fence of the
/// submission first.
///
/// Every creation failure is logged at Error severity by the backend and
/// leaves no partial object behind.
pub trait Device: Send + Sync {
    /// Backend implementing this device
    fn backend(&self) -> Backend;

    fn features(&self) -> &DeviceFeatures;

    fn limits(&self) -> &DeviceLimits;

    /// Get a queue; only index 0 exists for each type
    fn get_queue(&self, queue_type: QueueType, index: u32) -> Result<Arc<dyn Queue>>;

    /// Create a command list in the `NotRecording` state
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    // ===== BUFFERS =====

    /// Create a buffer
    ///
    /// # Returns
    ///
    /// The buffer handle, or `InvalidArgument` for a zero or oversized buffer
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle>;

    /// Write host data into a host-visible buffer
    ///
    /// Device-local buffers return `InvalidResource`: upload through a
    /// staging buffer and `CommandList::copy_buffer` instead.
    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Read back `size` bytes of a host-visible buffer
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    // ===== TEXTURES / SAMPLERS =====

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle>;

    fn destroy_texture(&self, texture: TextureHandle);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn destroy_sampler(&self, sampler: SamplerHandle);

    // ===== PIPELINES =====

    /// Create a graphics PSO
    ///
    /// # Arguments
    ///
    /// * `desc` - Shaders and fixed-function state
    /// * `layout` - Descriptor set layout at set 0 (`None` = empty)
    /// * `render_pass` - Pass the PSO renders in (`None` = implicit single-subpass pass)
    /// * `subpass` - Subpass index inside `render_pass`
    /// * `second_layout` - Optional layout at set 1
    fn create_graphics_pso(
        &self,
        desc: &GraphicsPsoDesc,
        layout: Option<DescriptorSetLayoutHandle>,
        render_pass: Option<RenderPassHandle>,
        subpass: u32,
        second_layout: Option<DescriptorSetLayoutHandle>,
    ) -> Result<PsoHandle>;

    fn create_compute_pso(
        &self,
        desc: &ComputePsoDesc,
        layout: Option<DescriptorSetLayoutHandle>,
    ) -> Result<PsoHandle>;

    fn destroy_pso(&self, pso: PsoHandle);

    // ===== DESCRIPTOR SETS =====

    fn create_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    fn allocate_descriptor_set(&self, layout: DescriptorSetLayoutHandle) -> Result<DescriptorSetHandle>;

    /// Apply writes; writes to bindings absent from the layout are ignored
    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]);

    /// Resource a binding of the set currently resolves to
    fn descriptor_binding(&self, set: DescriptorSetHandle, binding: u32) -> Option<DescriptorResource>;

    fn destroy_descriptor_set(&self, set: DescriptorSetHandle);

    // ===== RENDER PASSES =====

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;

    fn destroy_render_pass(&self, pass: RenderPassHandle);

    // ===== SYNCHRONIZATION =====

    fn create_fence(&self, initially_signaled: bool) -> Result<FenceHandle>;

    /// Block until the fence is signaled (no timeout)
    fn wait_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Signal the fence from the CPU
    fn signal_fence(&self, fence: FenceHandle) -> Result<()>;

    /// Return the fence to the unsignaled state
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    fn destroy_fence(&self, fence: FenceHandle);

    fn create_semaphore(&self) -> Result<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // ===== SWAP CHAINS =====

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<SwapChainHandle>;

    fn swap_chain_info(&self, swap_chain: SwapChainHandle) -> Result<SwapChainInfo>;

    /// Texture of the current back buffer
    fn swap_chain_back_buffer(&self, swap_chain: SwapChainHandle) -> Result<TextureHandle>;

    /// Present the current back buffer and advance to the next one
    fn present(&self, swap_chain: SwapChainHandle) -> Result<()>;

    /// Rebuild the back-buffer ring at a new size
    fn resize_swap_chain(&self, swap_chain: SwapChainHandle, width: u32, height: u32) -> Result<()>;

    fn set_vsync_mode(&self, swap_chain: SwapChainHandle, mode: VSyncMode) -> Result<()>;

    fn destroy_swap_chain(&self, swap_chain: SwapChainHandle);

    // ===== MISC =====

    /// Wait until every queue of the device is idle
    fn wait_idle(&self) -> Result<()>;
}

/// Write a slice of plain-old-data values into a host-visible buffer
///
/// # Example
///
/// ```no_run
/// # fn f(device: &dyn ten_rhi::rhi::device::Device, buffer: ten_rhi::rhi::device::BufferHandle) -> ten_rhi::rhi::Result<()> {
/// let matrix = [1.0f32, 0.0, 0.0, 1.0];
/// ten_rhi::rhi::device::update_buffer_slice(device, buffer, 0, &matrix)?;
/// # Ok(())
/// # }
/// ```
pub fn update_buffer_slice<T: bytemuck::Pod>(
    device: &dyn Device,
    buffer: BufferHandle,
    offset: u64,
    data: &[T],
) -> Result<()> {
    device.update_buffer(buffer, offset, bytemuck::cast_slice(data))
}

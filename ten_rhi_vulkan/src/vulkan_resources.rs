/// Object storage of the Vulkan backend
///
/// Every native object lives in a slot map behind one mutex on the shared
/// device state, named by the same generation-checked handles the software
/// backend uses.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use rustc_hash::FxHashMap;
use std::ffi::CString;
use ten_rhi::rhi::device::{
    BufferDesc, BufferHandle, DescriptorResource, DescriptorSetHandle, DescriptorSetLayoutDesc, DeviceId, HandleMap,
    DescriptorSetLayoutHandle, FenceHandle, GraphicsPsoDesc, PipelineKind, PsoHandle,
    RenderPassDesc, RenderPassHandle, SamplerDesc, SamplerHandle, SemaphoreHandle,
    SwapChainHandle, TextureDesc, TextureHandle,
};
use ten_rhi::rhi::{Error, Result};
use crate::vulkan_swapchain::VulkanSwapChain;

pub(crate) struct VulkanBuffer {
    pub buffer: vk::Buffer,
    /// Taken when the buffer is destroyed
    pub allocation: Option<Allocation>,
    pub desc: BufferDesc,
}

pub(crate) struct VulkanTexture {
    pub image: vk::Image,
    /// View over every mip and layer (sampling)
    pub view: vk::ImageView,
    /// Mip 0 / layer 0 view used as a framebuffer attachment; equal to `view`
    /// for single-subresource textures
    pub attachment_view: vk::ImageView,
    /// `None` for swap chain images, which the swap chain owns
    pub allocation: Option<Allocation>,
    pub desc: TextureDesc,
    pub swap_chain_image: bool,
}

pub(crate) struct VulkanSampler {
    pub sampler: vk::Sampler,
    pub desc: SamplerDesc,
}

/// Shader module plus the entry point it is invoked through
pub(crate) struct ShaderStage {
    pub module: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
    pub entry: CString,
}

pub(crate) struct VulkanPso {
    pub kind: PipelineKind,
    pub layout: vk::PipelineLayout,
    /// Schema of each set of `layout`; `None` for the empty set-0 placeholder
    pub set_schemas: Vec<Option<DescriptorSetLayoutDesc>>,
    /// Native layouts of each set, owned by the PSO; set 0 also backs transient uniform sets
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub stages: Vec<ShaderStage>,
    /// Graphics state kept to build pipelines for more passes later
    pub graphics: Option<GraphicsPsoDesc>,
    pub render_pass: Option<RenderPassHandle>,
    pub subpass: u32,
    /// Native pipelines keyed by (render pass, subpass); compute uses (null, 0)
    pub pipelines: FxHashMap<(vk::RenderPass, u32), vk::Pipeline>,
}

impl VulkanPso {
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        match self.kind {
            PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

pub(crate) struct VulkanSetLayout {
    pub layout: vk::DescriptorSetLayout,
    pub desc: DescriptorSetLayoutDesc,
}

pub(crate) struct VulkanDescriptorSet {
    pub set: vk::DescriptorSet,
    /// Pool the set was allocated from
    pub pool: vk::DescriptorPool,
    /// Copy of the layout schema, so the set stays usable if the layout is destroyed
    pub schema: DescriptorSetLayoutDesc,
    pub slots: FxHashMap<u32, DescriptorResource>,
}

pub(crate) struct VulkanRenderPass {
    pub render_pass: vk::RenderPass,
    pub desc: RenderPassDesc,
}

/// Every object of one Vulkan device
pub(crate) struct VulkanResources {
    pub buffers: HandleMap<BufferHandle, VulkanBuffer>,
    pub textures: HandleMap<TextureHandle, VulkanTexture>,
    pub samplers: HandleMap<SamplerHandle, VulkanSampler>,
    pub psos: HandleMap<PsoHandle, VulkanPso>,
    pub layouts: HandleMap<DescriptorSetLayoutHandle, VulkanSetLayout>,
    pub sets: HandleMap<DescriptorSetHandle, VulkanDescriptorSet>,
    pub render_passes: HandleMap<RenderPassHandle, VulkanRenderPass>,
    pub fences: HandleMap<FenceHandle, vk::Fence>,
    pub semaphores: HandleMap<SemaphoreHandle, vk::Semaphore>,
    pub swap_chains: HandleMap<SwapChainHandle, VulkanSwapChain>,
}

pub(crate) fn stale(kind: &str, handle: impl std::fmt::Debug) -> Error {
    Error::InvalidResource(format!("stale {} handle {:?}", kind, handle))
}

impl VulkanResources {
    pub fn new(device: DeviceId) -> Self {
        Self {
            buffers: HandleMap::new(device),
            textures: HandleMap::new(device),
            samplers: HandleMap::new(device),
            psos: HandleMap::new(device),
            layouts: HandleMap::new(device),
            sets: HandleMap::new(device),
            render_passes: HandleMap::new(device),
            fences: HandleMap::new(device),
            semaphores: HandleMap::new(device),
            swap_chains: HandleMap::new(device),
        }
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&VulkanBuffer> {
        self.buffers.get(handle).ok_or_else(|| stale("buffer", handle))
    }

    pub fn texture(&self, handle: TextureHandle) -> Result<&VulkanTexture> {
        self.textures.get(handle).ok_or_else(|| stale("texture", handle))
    }

    pub fn fence(&self, handle: FenceHandle) -> Result<vk::Fence> {
        self.fences.get(handle).copied().ok_or_else(|| stale("fence", handle))
    }
}

/// Vulkan device - the `Device` implementation of the Vulkan backend
///
/// Objects are created outside the resource lock where possible and inserted
/// once complete, so a failure never leaves a partial object in the tables.
/// Lock order: resources, then descriptor pools or the implicit pass cache,
/// then the allocator. Queue locks are taken last.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ash::vk;
use ten_rhi::rhi::device::{
    Backend, BufferDesc, BufferHandle, CommandList, ComputePsoDesc, DescriptorResource, DeviceId,
    DescriptorSetHandle, DescriptorSetLayoutDesc, DescriptorSetLayoutHandle, DescriptorWrite,
    Device, DeviceFeatures, DeviceLimits, FenceHandle, GraphicsPsoDesc, PipelineKind, PsoHandle,
    Queue, QueueType, RenderPassDesc, RenderPassHandle, RhiConfig, SamplerDesc, SamplerHandle,
    SemaphoreHandle, SwapChainDesc, SwapChainHandle, SwapChainInfo, TextureDesc, TextureHandle,
    VSyncMode,
};
use ten_rhi::rhi::Result;
use ten_rhi::{rhi_debug, rhi_error, rhi_info, rhi_invalid, rhi_trace};

use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::{lock, vk_err, GpuContext, MAX_BUFFER_SIZE_CAP};
use crate::vulkan_descriptor_set::{apply, create_layout, resolve_write, DescriptorPoolAllocator};
use crate::vulkan_pipeline::{
    build_compute_pipeline, build_graphics_pipeline, create_pipeline_layout, create_set_layouts,
    create_shader_stage, set_schemas,
};
use crate::vulkan_queue::VulkanQueue;
use crate::vulkan_render_pass::ImplicitPassCache;
use crate::vulkan_resources::{
    stale, VulkanDescriptorSet, VulkanPso, VulkanRenderPass, VulkanResources, VulkanSetLayout,
};
use crate::{vulkan_buffer, vulkan_pipeline, vulkan_render_pass, vulkan_swapchain, vulkan_texture};

const SOURCE: &str = "ten_rhi::vulkan::device";

/// State shared by the device, its queues and its command lists
pub(crate) struct VulkanShared {
    pub ctx: GpuContext,
    pub resources: Mutex<VulkanResources>,
    /// Pools of long-lived descriptor sets
    pub descriptor_pools: Mutex<DescriptorPoolAllocator>,
    pub implicit_passes: Mutex<ImplicitPassCache>,
    pub features: DeviceFeatures,
    pub limits: DeviceLimits,
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        self.ctx.wait_idle().ok();
        let ctx = &self.ctx;
        let device = &ctx.device;
        let resources = self.resources.get_mut().unwrap_or_else(PoisonError::into_inner);

        let swap_chains: Vec<_> = resources.swap_chains.drain().map(|(_, sc)| sc).collect();
        for swap_chain in swap_chains {
            vulkan_swapchain::destroy(ctx, &mut resources.textures, swap_chain);
        }
        for (_, texture) in resources.textures.drain() {
            vulkan_texture::destroy(ctx, texture);
        }
        for (_, buffer) in resources.buffers.drain() {
            vulkan_buffer::destroy(ctx, buffer);
        }
        for (_, sampler) in resources.samplers.drain() {
            vulkan_texture::destroy_sampler(ctx, sampler);
        }
        for (_, pso) in resources.psos.drain() {
            vulkan_pipeline::destroy(device, pso);
        }
        // Sets go away with their pools
        resources.sets.clear();
        unsafe {
            for (_, layout) in resources.layouts.drain() {
                device.destroy_descriptor_set_layout(layout.layout, None);
            }
            for (_, pass) in resources.render_passes.drain() {
                device.destroy_render_pass(pass.render_pass, None);
            }
            for (_, fence) in resources.fences.drain() {
                device.destroy_fence(fence, None);
            }
            for (_, semaphore) in resources.semaphores.drain() {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.descriptor_pools.get_mut().unwrap_or_else(PoisonError::into_inner).destroy(device);
        self.implicit_passes.get_mut().unwrap_or_else(PoisonError::into_inner).destroy(device);
    }
}

/// Vulkan device
pub struct VulkanDevice {
    shared: Arc<VulkanShared>,
    /// One queue per `QueueType`, in `QueueType::ALL` order
    queues: Vec<Arc<VulkanQueue>>,
}

impl VulkanDevice {
    /// Create the instance, pick a GPU and create the logical device
    pub fn new(config: &RhiConfig) -> Result<Self> {
        let ctx = GpuContext::new(config)?;
        let native_limits = ctx.properties.limits;
        let features = DeviceFeatures {
            max_texture_dimension_2d: native_limits.max_image_dimension2_d,
            max_texture_dimension_3d: native_limits.max_image_dimension3_d,
            ray_tracing: false,
            occlusion_queries: true,
        };
        let max_buffer_size = match ctx.max_allocation_size {
            0 => MAX_BUFFER_SIZE_CAP,
            size => size.min(MAX_BUFFER_SIZE_CAP),
        };
        let limits = DeviceLimits {
            max_buffer_size,
            max_texture_dimension_2d: features.max_texture_dimension_2d,
            max_texture_dimension_3d: features.max_texture_dimension_3d,
            max_texture_array_layers: native_limits.max_image_array_layers,
            min_uniform_buffer_offset_alignment: native_limits.min_uniform_buffer_offset_alignment,
        };
        let descriptor_pools =
            DescriptorPoolAllocator::new(&ctx.device, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)?;

        let shared = Arc::new(VulkanShared {
            ctx,
            resources: Mutex::new(VulkanResources::new(DeviceId::next())),
            descriptor_pools: Mutex::new(descriptor_pools),
            implicit_passes: Mutex::new(ImplicitPassCache::default()),
            features,
            limits,
        });
        let queues = QueueType::ALL
            .into_iter()
            .map(|queue_type| Arc::new(VulkanQueue::new(queue_type, Arc::clone(&shared))))
            .collect();

        rhi_info!(SOURCE, "Vulkan device created for '{}'", config.app_name);
        Ok(Self { shared, queues })
    }

    fn queue(&self, queue_type: QueueType) -> &Arc<VulkanQueue> {
        let index = match queue_type {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
        };
        &self.queues[index]
    }

    fn resources(&self) -> MutexGuard<'_, VulkanResources> {
        lock(&self.shared.resources)
    }

    fn device(&self) -> &ash::Device {
        &self.shared.ctx.device
    }

    /// Number of descriptor pools backing long-lived descriptor sets
    pub fn descriptor_pool_count(&self) -> usize {
        lock(&self.shared.descriptor_pools).pool_count()
    }

    /// Number of render passes created for `begin_render_pass` without an explicit pass
    pub fn implicit_render_pass_count(&self) -> usize {
        lock(&self.shared.implicit_passes).len()
    }

    /// Layouts, pipeline layout and shader stages of a new PSO
    fn build_pso(
        &self,
        kind: PipelineKind,
        schemas: Vec<Option<DescriptorSetLayoutDesc>>,
        stages: &[(&[u8], vk::ShaderStageFlags)],
    ) -> Result<VulkanPso> {
        let device = self.device();
        let set_layouts = create_set_layouts(device, &schemas)?;
        let layout = match create_pipeline_layout(device, &set_layouts) {
            Ok(layout) => layout,
            Err(e) => {
                for set_layout in set_layouts {
                    unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                }
                return Err(e);
            }
        };
        let mut pso = VulkanPso {
            kind,
            layout,
            set_schemas: schemas,
            set_layouts,
            stages: Vec::with_capacity(stages.len()),
            graphics: None,
            render_pass: None,
            subpass: 0,
            pipelines: Default::default(),
        };
        for &(bytes, stage) in stages {
            match create_shader_stage(device, bytes, stage, &pso.set_schemas) {
                Ok(created) => pso.stages.push(created),
                Err(e) => {
                    vulkan_pipeline::destroy(device, pso);
                    return Err(e);
                }
            }
        }
        Ok(pso)
    }

    /// Schema of an optional layout handle
    fn schema(
        resources: &VulkanResources,
        layout: Option<DescriptorSetLayoutHandle>,
    ) -> Result<Option<DescriptorSetLayoutDesc>> {
        match layout {
            None => Ok(None),
            Some(handle) => resources
                .layouts
                .get(handle)
                .map(|record| Some(record.desc.clone()))
                .ok_or_else(|| stale("descriptor set layout", handle)),
        }
    }
}

/// Log a failed operation at Error severity and pass the result through
fn logged<T>(op: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        rhi_error!(SOURCE, "{} failed: {}", op, e);
    }
    result
}

impl Device for VulkanDevice {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn features(&self) -> &DeviceFeatures {
        &self.shared.features
    }

    fn limits(&self) -> &DeviceLimits {
        &self.shared.limits
    }

    fn get_queue(&self, queue_type: QueueType, index: u32) -> Result<Arc<dyn Queue>> {
        if index > 0 {
            rhi_invalid!(SOURCE, "get_queue: only index 0 exists for {:?} (got {})", queue_type, index);
        }
        Ok(Arc::clone(self.queue(queue_type)) as Arc<dyn Queue>)
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        let list = logged("create_command_list", VulkanCommandList::new(Arc::clone(&self.shared)))?;
        Ok(Box::new(list))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        logged("create_buffer", desc.validate(&self.shared.limits))?;
        let buffer = logged("create_buffer", vulkan_buffer::create(&self.shared.ctx, desc))?;
        let handle = self.resources().buffers.insert(buffer);
        rhi_trace!(SOURCE, "Created buffer {:?} ({} bytes)", handle, desc.size);
        Ok(handle)
    }

    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut resources = self.resources();
        let result = match resources.buffers.get_mut(buffer) {
            Some(record) => vulkan_buffer::write(record, offset, data),
            None => Err(stale("buffer", buffer)),
        };
        logged("update_buffer", result)
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        let resources = self.resources();
        let result = resources.buffer(buffer).and_then(|record| vulkan_buffer::read(record, offset, size));
        logged("read_buffer", result)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let removed = self.resources().buffers.remove(buffer);
        match removed {
            Some(record) => vulkan_buffer::destroy(&self.shared.ctx, record),
            None => rhi_trace!(SOURCE, "destroy_buffer: stale handle {:?}", buffer),
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle> {
        logged("create_texture", desc.validate(&self.shared.limits))?;
        let texture = logged("create_texture", vulkan_texture::create(&self.shared.ctx, desc))?;
        let handle = self.resources().textures.insert(texture);
        rhi_trace!(SOURCE, "Created texture {:?} ({}x{} {:?})", handle, desc.width, desc.height, desc.format);
        Ok(handle)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut resources = self.resources();
        let swap_chain_image = resources.textures.get(texture).map(|record| record.swap_chain_image);
        match swap_chain_image {
            Some(true) => rhi_trace!(SOURCE, "destroy_texture: {:?} belongs to a swap chain", texture),
            Some(false) => {
                if let Some(record) = resources.textures.remove(texture) {
                    vulkan_texture::destroy(&self.shared.ctx, record);
                }
            }
            None => rhi_trace!(SOURCE, "destroy_texture: stale handle {:?}", texture),
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let sampler = logged("create_sampler", vulkan_texture::create_sampler(&self.shared.ctx, desc))?;
        Ok(self.resources().samplers.insert(sampler))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        let removed = self.resources().samplers.remove(sampler);
        match removed {
            Some(record) => vulkan_texture::destroy_sampler(&self.shared.ctx, record),
            None => rhi_trace!(SOURCE, "destroy_sampler: stale handle {:?}", sampler),
        }
    }

    fn create_graphics_pso(
        &self,
        desc: &GraphicsPsoDesc,
        layout: Option<DescriptorSetLayoutHandle>,
        render_pass: Option<RenderPassHandle>,
        subpass: u32,
        second_layout: Option<DescriptorSetLayoutHandle>,
    ) -> Result<PsoHandle> {
        logged("create_graphics_pso", desc.validate())?;
        if desc.vertex_shader.is_empty() {
            rhi_invalid!(SOURCE, "create_graphics_pso: Vulkan pipelines need vertex bytecode");
        }
        // Held throughout: the explicit pass must stay alive while its pipeline is built
        let mut resources = self.resources();
        let first = logged("create_graphics_pso", Self::schema(&resources, layout))?;
        let second = logged("create_graphics_pso", Self::schema(&resources, second_layout))?;
        let pass = match render_pass {
            Some(handle) => match resources.render_passes.get(handle) {
                Some(record) => Some((record.render_pass, record.desc.clone())),
                None => return logged("create_graphics_pso", Err(stale("render pass", handle))),
            },
            None => None,
        };
        let subpass_count = pass.as_ref().map_or(1, |(_, pass_desc)| pass_desc.subpass_count());
        if subpass >= subpass_count {
            rhi_invalid!(SOURCE, "create_graphics_pso: subpass {} out of range ({} subpasses)", subpass, subpass_count);
        }

        let mut stages = vec![(desc.vertex_shader.as_bytes(), vk::ShaderStageFlags::VERTEX)];
        if !desc.fragment_shader.is_empty() {
            stages.push((desc.fragment_shader.as_bytes(), vk::ShaderStageFlags::FRAGMENT));
        }
        let mut pso = logged(
            "create_graphics_pso",
            self.build_pso(PipelineKind::Graphics, set_schemas(first, second), &stages),
        )?;
        pso.graphics = Some(desc.clone());
        pso.render_pass = render_pass;
        pso.subpass = subpass;

        if let Some((native_pass, pass_desc)) = pass {
            let color_count = pass_desc.subpasses[subpass as usize].color_attachments.len();
            match build_graphics_pipeline(self.device(), &pso, native_pass, subpass, color_count) {
                Ok(pipeline) => {
                    pso.pipelines.insert((native_pass, subpass), pipeline);
                }
                Err(e) => {
                    vulkan_pipeline::destroy(self.device(), pso);
                    return logged("create_graphics_pso", Err(e));
                }
            }
        }
        Ok(resources.psos.insert(pso))
    }

    fn create_compute_pso(&self, desc: &ComputePsoDesc, layout: Option<DescriptorSetLayoutHandle>) -> Result<PsoHandle> {
        logged("create_compute_pso", desc.validate())?;
        let first = logged("create_compute_pso", Self::schema(&self.resources(), layout))?;
        let stages = [(desc.compute_shader.as_bytes(), vk::ShaderStageFlags::COMPUTE)];
        let mut pso = logged(
            "create_compute_pso",
            self.build_pso(PipelineKind::Compute, set_schemas(first, None), &stages),
        )?;
        match build_compute_pipeline(self.device(), &pso) {
            Ok(pipeline) => {
                pso.pipelines.insert((vk::RenderPass::null(), 0), pipeline);
            }
            Err(e) => {
                vulkan_pipeline::destroy(self.device(), pso);
                return logged("create_compute_pso", Err(e));
            }
        }
        Ok(self.resources().psos.insert(pso))
    }

    fn destroy_pso(&self, pso: PsoHandle) {
        let removed = self.resources().psos.remove(pso);
        match removed {
            Some(record) => vulkan_pipeline::destroy(self.device(), record),
            None => rhi_trace!(SOURCE, "destroy_pso: stale handle {:?}", pso),
        }
    }

    fn create_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        logged("create_descriptor_set_layout", desc.validate())?;
        let layout = logged("create_descriptor_set_layout", create_layout(self.device(), desc))?;
        Ok(self.resources().layouts.insert(VulkanSetLayout { layout, desc: desc.clone() }))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        let removed = self.resources().layouts.remove(layout);
        match removed {
            Some(record) => unsafe { self.device().destroy_descriptor_set_layout(record.layout, None) },
            None => rhi_trace!(SOURCE, "destroy_descriptor_set_layout: stale handle {:?}", layout),
        }
    }

    fn allocate_descriptor_set(&self, layout: DescriptorSetLayoutHandle) -> Result<DescriptorSetHandle> {
        let mut resources = self.resources();
        let (native_layout, schema) = match resources.layouts.get(layout) {
            Some(record) => (record.layout, record.desc.clone()),
            None => return logged("allocate_descriptor_set", Err(stale("descriptor set layout", layout))),
        };
        let allocated = lock(&self.shared.descriptor_pools).allocate(self.device(), native_layout);
        let (set, pool) = logged("allocate_descriptor_set", allocated)?;
        Ok(resources.sets.insert(VulkanDescriptorSet { set, pool, schema, slots: Default::default() }))
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        let mut resources = self.resources();
        let Some(target) = resources.sets.get(set) else {
            rhi_trace!(SOURCE, "update_descriptor_set: stale handle {:?}", set);
            return;
        };
        let mut native = Vec::with_capacity(writes.len());
        let mut accepted = Vec::with_capacity(writes.len());
        for write in writes {
            let Some(binding) = target.schema.find(write.binding) else {
                rhi_trace!(SOURCE, "update_descriptor_set: binding {} not in layout", write.binding);
                continue;
            };
            if !write.resource.fits(binding.ty) {
                rhi_trace!(SOURCE, "update_descriptor_set: binding {} expects {:?}", write.binding, binding.ty);
                continue;
            }
            match resolve_write(&resources, binding, write.resource) {
                Ok(resolved) => {
                    native.push(resolved);
                    accepted.push((write.binding, write.resource));
                }
                Err(reason) => {
                    rhi_trace!(SOURCE, "update_descriptor_set: {} for binding {}", reason, write.binding);
                }
            }
        }
        apply(self.device(), target.set, &native, &[]);
        if let Some(target) = resources.sets.get_mut(set) {
            target.slots.extend(accepted);
        }
    }

    fn descriptor_binding(&self, set: DescriptorSetHandle, binding: u32) -> Option<DescriptorResource> {
        self.resources().sets.get(set)?.slots.get(&binding).copied()
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetHandle) {
        let removed = self.resources().sets.remove(set);
        match removed {
            Some(record) => lock(&self.shared.descriptor_pools).free(self.device(), record.pool, record.set),
            None => rhi_trace!(SOURCE, "destroy_descriptor_set: stale handle {:?}", set),
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        logged("create_render_pass", desc.validate())?;
        let render_pass = logged("create_render_pass", vulkan_render_pass::create(self.device(), desc))?;
        Ok(self.resources().render_passes.insert(VulkanRenderPass { render_pass, desc: desc.clone() }))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        let mut resources = self.resources();
        let Some(record) = resources.render_passes.remove(pass) else {
            rhi_trace!(SOURCE, "destroy_render_pass: stale handle {:?}", pass);
            return;
        };
        let device = self.device();
        // The native handle may be reused by a later pass; drop pipelines keyed on it
        for pso in resources.psos.values_mut() {
            pso.pipelines.retain(|&(native_pass, _), pipeline| {
                let keep = native_pass != record.render_pass;
                if !keep {
                    unsafe { device.destroy_pipeline(*pipeline, None) };
                }
                keep
            });
        }
        unsafe { device.destroy_render_pass(record.render_pass, None) };
    }

    fn create_fence(&self, initially_signaled: bool) -> Result<FenceHandle> {
        let flags = if initially_signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe { self.device().create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| vk_err("Failed to create fence", e))?;
        Ok(self.resources().fences.insert(fence))
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<()> {
        let target = self.resources().fence(fence);
        match target {
            // Wait outside the lock; destroying a fence while it is waited on is a caller error
            Ok(target) => unsafe { self.device().wait_for_fences(&[target], true, u64::MAX) }
                .map_err(|e| vk_err("Failed to wait for fence", e)),
            Err(e) => logged("wait_fence", Err(e)),
        }
    }

    /// Vulkan fences cannot be signaled from the host: an empty submission on
    /// the graphics queue signals it once earlier work there has completed.
    fn signal_fence(&self, fence: FenceHandle) -> Result<()> {
        let target = logged("signal_fence", self.resources().fence(fence))?;
        let device = self.device();
        unsafe {
            if let Ok(true) = device.get_fence_status(target) {
                return Ok(());
            }
            let queue = lock(self.shared.ctx.queue(QueueType::Graphics));
            device.queue_submit(*queue, &[], target).map_err(|e| vk_err("Failed to signal fence", e))
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let target = logged("reset_fence", self.resources().fence(fence))?;
        unsafe { self.device().reset_fences(&[target]) }.map_err(|e| vk_err("Failed to reset fence", e))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let removed = self.resources().fences.remove(fence);
        match removed {
            Some(target) => unsafe { self.device().destroy_fence(target, None) },
            None => rhi_trace!(SOURCE, "destroy_fence: stale handle {:?}", fence),
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let semaphore = unsafe { self.device().create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| vk_err("Failed to create semaphore", e))?;
        Ok(self.resources().semaphores.insert(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let removed = self.resources().semaphores.remove(semaphore);
        match removed {
            Some(target) => unsafe { self.device().destroy_semaphore(target, None) },
            None => rhi_trace!(SOURCE, "destroy_semaphore: stale handle {:?}", semaphore),
        }
    }

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<SwapChainHandle> {
        logged("create_swap_chain", desc.validate(&self.shared.limits))?;
        if desc.enable_hdr {
            rhi_debug!(SOURCE, "create_swap_chain: HDR metadata is not applied by the Vulkan backend");
        }
        let mut guard = self.resources();
        let resources = &mut *guard;
        let swap_chain = logged(
            "create_swap_chain",
            vulkan_swapchain::create(&self.shared.ctx, &mut resources.textures, desc),
        )?;
        Ok(resources.swap_chains.insert(swap_chain))
    }

    fn swap_chain_info(&self, swap_chain: SwapChainHandle) -> Result<SwapChainInfo> {
        match self.resources().swap_chains.get(swap_chain) {
            Some(sc) => Ok(SwapChainInfo {
                width: sc.extent.width,
                height: sc.extent.height,
                current_index: sc.current,
                buffer_count: sc.images.len() as u32,
                format: sc.format,
                vsync_mode: sc.vsync_mode,
                color_space: sc.color_space,
                hdr_enabled: sc.desc.enable_hdr,
            }),
            None => logged("swap_chain_info", Err(stale("swap chain", swap_chain))),
        }
    }

    fn swap_chain_back_buffer(&self, swap_chain: SwapChainHandle) -> Result<TextureHandle> {
        match self.resources().swap_chains.get(swap_chain) {
            Some(sc) => Ok(sc.images[sc.current as usize]),
            None => logged("swap_chain_back_buffer", Err(stale("swap chain", swap_chain))),
        }
    }

    fn present(&self, swap_chain: SwapChainHandle) -> Result<()> {
        let result = match self.resources().swap_chains.get_mut(swap_chain) {
            Some(sc) => vulkan_swapchain::present(&self.shared.ctx, sc),
            None => Err(stale("swap chain", swap_chain)),
        };
        logged("present", result)
    }

    fn resize_swap_chain(&self, swap_chain: SwapChainHandle, width: u32, height: u32) -> Result<()> {
        logged("resize_swap_chain", SwapChainDesc::validate_extent(width, height, &self.shared.limits))?;
        let mut guard = self.resources();
        let resources = &mut *guard;
        let Some(sc) = resources.swap_chains.get_mut(swap_chain) else {
            return logged("resize_swap_chain", Err(stale("swap chain", swap_chain)));
        };
        sc.desc.width = width;
        sc.desc.height = height;
        logged(
            "resize_swap_chain",
            vulkan_swapchain::rebuild(&self.shared.ctx, &mut resources.textures, sc),
        )?;
        rhi_info!(SOURCE, "Swap chain resized to {}x{}", sc.extent.width, sc.extent.height);
        Ok(())
    }

    fn set_vsync_mode(&self, swap_chain: SwapChainHandle, mode: VSyncMode) -> Result<()> {
        let mut guard = self.resources();
        let resources = &mut *guard;
        let Some(sc) = resources.swap_chains.get_mut(swap_chain) else {
            return logged("set_vsync_mode", Err(stale("swap chain", swap_chain)));
        };
        sc.desc.vsync = mode != VSyncMode::Off;
        sc.desc.vsync_mode = mode;
        sc.desc.present_mode = None;
        logged(
            "set_vsync_mode",
            vulkan_swapchain::rebuild(&self.shared.ctx, &mut resources.textures, sc),
        )
    }

    fn destroy_swap_chain(&self, swap_chain: SwapChainHandle) {
        let mut guard = self.resources();
        let resources = &mut *guard;
        match resources.swap_chains.remove(swap_chain) {
            Some(sc) => {
                // Back buffers may still be in flight
                self.shared.ctx.wait_idle().ok();
                vulkan_swapchain::destroy(&self.shared.ctx, &mut resources.textures, sc);
            }
            None => rhi_trace!(SOURCE, "destroy_swap_chain: stale handle {:?}", swap_chain),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.shared.ctx.wait_idle()
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let _ = self.wait_idle();
        rhi_trace!(SOURCE, "Vulkan device destroyed");
    }
}

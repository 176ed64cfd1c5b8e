/// Software device - CPU implementation of the whole RHI contract
///
/// Objects are byte vectors and descriptors kept in slot maps. Queue workers
/// execute recorded commands against them, so uploads, copies, clears and
/// readbacks produce real data without a GPU.

use std::sync::{Arc, Mutex};
use crate::device::{
    Backend, BufferDesc, BufferHandle, CommandList, ComputePsoDesc, DescriptorResource, DeviceId,
    DescriptorSetHandle, DescriptorSetLayoutDesc, DescriptorSetLayoutHandle, DescriptorWrite,
    Device, DeviceFeatures, DeviceLimits, FenceHandle, GraphicsPsoDesc, MemoryLocation,
    PipelineKind, PsoHandle, Queue, QueueType, RenderPassDesc, RenderPassHandle, RhiConfig,
    SamplerDesc, SamplerHandle, SemaphoreHandle, SwapChainDesc, SwapChainHandle, SwapChainInfo,
    TextureDesc, TextureHandle, TextureUsage, VSyncMode,
};
use crate::error::{Error, Result};
use crate::software::software_command_list::SoftwareCommandList;
use crate::software::software_queue::{SoftwareQueue, SoftwareQueueStats};
use crate::software::software_resources::{
    SoftwareBuffer, SoftwareDescriptorSet, SoftwarePso, SoftwareResources, SoftwareSwapChain,
    SoftwareTexture,
};
use crate::software::software_sync::{lock, SoftwareFence, SoftwareSemaphore};
use crate::{rhi_error, rhi_info, rhi_invalid, rhi_trace};

const SOURCE: &str = "ten_rhi::software::device";

/// State shared by the device, its queues and its command lists
pub(crate) struct SoftwareShared {
    pub resources: Mutex<SoftwareResources>,
    pub features: DeviceFeatures,
    pub limits: DeviceLimits,
}

/// CPU reference device
pub struct SoftwareDevice {
    shared: Arc<SoftwareShared>,
    /// One queue per `QueueType`, in `QueueType::ALL` order
    queues: Vec<Arc<SoftwareQueue>>,
}

impl SoftwareDevice {
    /// Create a device and start one worker thread per queue
    pub fn new(config: &RhiConfig) -> Result<Self> {
        let features = DeviceFeatures {
            max_texture_dimension_2d: 16384,
            max_texture_dimension_3d: 2048,
            ray_tracing: false,
            occlusion_queries: true,
        };
        let limits = DeviceLimits {
            max_buffer_size: 256 * 1024 * 1024,
            max_texture_dimension_2d: features.max_texture_dimension_2d,
            max_texture_dimension_3d: features.max_texture_dimension_3d,
            max_texture_array_layers: 2048,
            min_uniform_buffer_offset_alignment: 256,
        };
        let shared = Arc::new(SoftwareShared {
            resources: Mutex::new(SoftwareResources::new(DeviceId::next())),
            features,
            limits,
        });

        let mut queues = Vec::with_capacity(QueueType::ALL.len());
        for queue_type in QueueType::ALL {
            let queue = SoftwareQueue::new(queue_type, Arc::clone(&shared), &config.software_worker_name)
                .inspect_err(|e| rhi_error!(SOURCE, "Failed to create {:?} queue: {}", queue_type, e))?;
            queues.push(Arc::new(queue));
        }

        rhi_info!(SOURCE, "Software device created for '{}'", config.app_name);
        Ok(Self { shared, queues })
    }

    fn queue(&self, queue_type: QueueType) -> &Arc<SoftwareQueue> {
        let index = match queue_type {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Copy => 2,
        };
        &self.queues[index]
    }

    /// Execution counters of a queue
    pub fn queue_stats(&self, queue_type: QueueType) -> SoftwareQueueStats {
        self.queue(queue_type).stats()
    }

    fn resources(&self) -> std::sync::MutexGuard<'_, SoftwareResources> {
        lock(&self.shared.resources)
    }

    fn create_texture_locked(resources: &mut SoftwareResources, desc: &TextureDesc) -> Result<TextureHandle> {
        Ok(resources.textures.insert(SoftwareTexture::new(desc.clone())?))
    }

    /// Back-buffer ring of a swap chain; nothing is left behind on failure
    fn swap_chain_images(
        resources: &mut SoftwareResources,
        limits: &DeviceLimits,
        desc: &SwapChainDesc,
    ) -> Result<Vec<TextureHandle>> {
        let mut image = TextureDesc::render_target(desc.width, desc.height, desc.format);
        image.usage |= TextureUsage::COPY_SRC;
        image.validate(limits)?;
        let mut images = Vec::with_capacity(desc.buffer_count as usize);
        for _ in 0..desc.buffer_count {
            match Self::create_texture_locked(resources, &image) {
                Ok(handle) => images.push(handle),
                Err(e) => {
                    for handle in images {
                        resources.textures.remove(handle);
                    }
                    return Err(e);
                }
            }
        }
        Ok(images)
    }
}

/// Log a failed operation at Error severity and pass the result through
fn logged<T>(op: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        rhi_error!(SOURCE, "{} failed: {}", op, e);
    }
    result
}

fn stale(kind: &str, handle: impl std::fmt::Debug) -> Error {
    Error::InvalidResource(format!("stale {} handle {:?}", kind, handle))
}

impl Device for SoftwareDevice {
    fn backend(&self) -> Backend {
        Backend::Software
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
        Ok(Box::new(SoftwareCommandList::new(Arc::clone(&self.shared))))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        logged("create_buffer", desc.validate(&self.shared.limits))?;
        let buffer = SoftwareBuffer { desc: desc.clone(), data: vec![0u8; desc.size as usize] };
        let handle = self.resources().buffers.insert(buffer);
        rhi_trace!(SOURCE, "Created buffer {:?} ({} bytes)", handle, desc.size);
        Ok(handle)
    }

    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut resources = self.resources();
        let result = match resources.buffers.get_mut(buffer) {
            None => Err(stale("buffer", buffer)),
            Some(b) if b.desc.memory_location() != MemoryLocation::HostVisible => Err(Error::InvalidResource(
                "buffer is device-local; upload through a staging buffer".to_string(),
            )),
            Some(b) => {
                let start = offset as usize;
                match start.checked_add(data.len()).filter(|&end| end <= b.data.len()) {
                    Some(end) => {
                        b.data[start..end].copy_from_slice(data);
                        Ok(())
                    }
                    None => Err(Error::InvalidArgument(format!(
                        "write of {} bytes at offset {} exceeds buffer size {}",
                        data.len(), offset, b.desc.size
                    ))),
                }
            }
        };
        logged("update_buffer", result)
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> Result<Vec<u8>> {
        let resources = self.resources();
        let result = match resources.buffers.get(buffer) {
            None => Err(stale("buffer", buffer)),
            Some(b) if b.desc.memory_location() != MemoryLocation::HostVisible => Err(Error::InvalidResource(
                "buffer is device-local; copy it into a staging buffer first".to_string(),
            )),
            Some(b) => offset
                .checked_add(size)
                .filter(|&end| end <= b.desc.size)
                .map(|end| b.data[offset as usize..end as usize].to_vec())
                .ok_or_else(|| Error::InvalidArgument(format!(
                    "read of {} bytes at offset {} exceeds buffer size {}",
                    size, offset, b.desc.size
                ))),
        };
        logged("read_buffer", result)
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if self.resources().buffers.remove(buffer).is_none() {
            rhi_trace!(SOURCE, "destroy_buffer: stale handle {:?}", buffer);
        }
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<TextureHandle> {
        logged("create_texture", desc.validate(&self.shared.limits))?;
        logged("create_texture", Self::create_texture_locked(&mut self.resources(), desc))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if self.resources().textures.remove(texture).is_none() {
            rhi_trace!(SOURCE, "destroy_texture: stale handle {:?}", texture);
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        Ok(self.resources().samplers.insert(*desc))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        if self.resources().samplers.remove(sampler).is_none() {
            rhi_trace!(SOURCE, "destroy_sampler: stale handle {:?}", sampler);
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
        let mut resources = self.resources();
        for handle in [layout, second_layout].into_iter().flatten() {
            if !resources.layouts.contains_key(handle) {
                return logged("create_graphics_pso", Err(stale("descriptor set layout", handle)));
            }
        }
        let subpass_count = match render_pass {
            Some(pass) => match resources.render_passes.get(pass) {
                Some(pass_desc) => pass_desc.subpass_count(),
                None => return logged("create_graphics_pso", Err(stale("render pass", pass))),
            },
            None => 1,
        };
        if subpass >= subpass_count {
            rhi_invalid!(SOURCE, "create_graphics_pso: subpass {} out of range ({} subpasses)", subpass, subpass_count);
        }
        Ok(resources.psos.insert(SoftwarePso {
            kind: PipelineKind::Graphics,
            layouts: [layout, second_layout],
            render_pass,
            subpass,
        }))
    }

    fn create_compute_pso(&self, desc: &ComputePsoDesc, layout: Option<DescriptorSetLayoutHandle>) -> Result<PsoHandle> {
        logged("create_compute_pso", desc.validate())?;
        let mut resources = self.resources();
        if let Some(handle) = layout.filter(|&h| !resources.layouts.contains_key(h)) {
            return logged("create_compute_pso", Err(stale("descriptor set layout", handle)));
        }
        Ok(resources.psos.insert(SoftwarePso {
            kind: PipelineKind::Compute,
            layouts: [layout, None],
            render_pass: None,
            subpass: 0,
        }))
    }

    fn destroy_pso(&self, pso: PsoHandle) {
        if self.resources().psos.remove(pso).is_none() {
            rhi_trace!(SOURCE, "destroy_pso: stale handle {:?}", pso);
        }
    }

    fn create_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<DescriptorSetLayoutHandle> {
        logged("create_descriptor_set_layout", desc.validate())?;
        Ok(self.resources().layouts.insert(desc.clone()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        if self.resources().layouts.remove(layout).is_none() {
            rhi_trace!(SOURCE, "destroy_descriptor_set_layout: stale handle {:?}", layout);
        }
    }

    fn allocate_descriptor_set(&self, layout: DescriptorSetLayoutHandle) -> Result<DescriptorSetHandle> {
        let mut resources = self.resources();
        let schema = match resources.layouts.get(layout) {
            Some(schema) => schema.clone(),
            None => return logged("allocate_descriptor_set", Err(stale("descriptor set layout", layout))),
        };
        Ok(resources.sets.insert(SoftwareDescriptorSet { schema, slots: Default::default() }))
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        let mut guard = self.resources();
        let resources = &mut *guard;
        let Some(target) = resources.sets.get_mut(set) else {
            rhi_trace!(SOURCE, "update_descriptor_set: stale handle {:?}", set);
            return;
        };
        for write in writes {
            let Some(binding) = target.schema.find(write.binding) else {
                rhi_trace!(SOURCE, "update_descriptor_set: binding {} not in layout", write.binding);
                continue;
            };
            if !write.resource.fits(binding.ty) {
                rhi_trace!(SOURCE, "update_descriptor_set: binding {} expects {:?}", write.binding, binding.ty);
                continue;
            }
            let alive = match write.resource {
                DescriptorResource::Buffer { buffer, .. } => resources.buffers.contains_key(buffer),
                DescriptorResource::Texture(texture) => resources.textures.contains_key(texture),
                DescriptorResource::Sampler(sampler) => resources.samplers.contains_key(sampler),
            };
            if !alive {
                rhi_trace!(SOURCE, "update_descriptor_set: stale resource for binding {}", write.binding);
                continue;
            }
            target.slots.insert(write.binding, write.resource);
        }
    }

    fn descriptor_binding(&self, set: DescriptorSetHandle, binding: u32) -> Option<DescriptorResource> {
        self.resources().sets.get(set)?.slots.get(&binding).copied()
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetHandle) {
        if self.resources().sets.remove(set).is_none() {
            rhi_trace!(SOURCE, "destroy_descriptor_set: stale handle {:?}", set);
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        logged("create_render_pass", desc.validate())?;
        Ok(self.resources().render_passes.insert(desc.clone()))
    }

    fn destroy_render_pass(&self, pass: RenderPassHandle) {
        if self.resources().render_passes.remove(pass).is_none() {
            rhi_trace!(SOURCE, "destroy_render_pass: stale handle {:?}", pass);
        }
    }

    fn create_fence(&self, initially_signaled: bool) -> Result<FenceHandle> {
        Ok(self.resources().fences.insert(Arc::new(SoftwareFence::new(initially_signaled))))
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<()> {
        let target = self.resources().fences.get(fence).cloned();
        match target {
            // Wait outside the lock: the queue worker needs it to finish the work
            Some(target) => {
                target.wait();
                Ok(())
            }
            None => logged("wait_fence", Err(stale("fence", fence))),
        }
    }

    fn signal_fence(&self, fence: FenceHandle) -> Result<()> {
        match self.resources().fences.get(fence) {
            Some(target) => {
                target.signal();
                Ok(())
            }
            None => logged("signal_fence", Err(stale("fence", fence))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        match self.resources().fences.get(fence) {
            Some(target) => {
                target.reset();
                Ok(())
            }
            None => logged("reset_fence", Err(stale("fence", fence))),
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if self.resources().fences.remove(fence).is_none() {
            rhi_trace!(SOURCE, "destroy_fence: stale handle {:?}", fence);
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        Ok(self.resources().semaphores.insert(Arc::new(SoftwareSemaphore::new())))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        if self.resources().semaphores.remove(semaphore).is_none() {
            rhi_trace!(SOURCE, "destroy_semaphore: stale handle {:?}", semaphore);
        }
    }

    fn create_swap_chain(&self, desc: &SwapChainDesc) -> Result<SwapChainHandle> {
        logged("create_swap_chain", desc.validate(&self.shared.limits))?;
        let mut resources = self.resources();
        let images = logged("create_swap_chain", Self::swap_chain_images(&mut resources, &self.shared.limits, desc))?;
        let vsync_mode = if desc.vsync { desc.vsync_mode } else { VSyncMode::Off };
        let handle = resources.swap_chains.insert(SoftwareSwapChain {
            desc: desc.clone(),
            images,
            current: 0,
            vsync_mode,
        });
        rhi_info!(
            SOURCE,
            "Swap chain created: {}x{}, {} buffers{}",
            desc.width,
            desc.height,
            desc.buffer_count,
            if desc.surface.is_none() { " (headless)" } else { "" }
        );
        Ok(handle)
    }

    fn swap_chain_info(&self, swap_chain: SwapChainHandle) -> Result<SwapChainInfo> {
        match self.resources().swap_chains.get(swap_chain) {
            Some(sc) => Ok(SwapChainInfo {
                width: sc.desc.width,
                height: sc.desc.height,
                current_index: sc.current,
                buffer_count: sc.images.len() as u32,
                format: sc.desc.format,
                vsync_mode: sc.vsync_mode,
                color_space: sc.desc.color_space,
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
        match self.resources().swap_chains.get_mut(swap_chain) {
            Some(sc) => {
                sc.current = (sc.current + 1) % sc.images.len() as u32;
                Ok(())
            }
            None => logged("present", Err(stale("swap chain", swap_chain))),
        }
    }

    fn resize_swap_chain(&self, swap_chain: SwapChainHandle, width: u32, height: u32) -> Result<()> {
        logged("resize_swap_chain", SwapChainDesc::validate_extent(width, height, &self.shared.limits))?;
        let mut guard = self.resources();
        let resources = &mut *guard;
        let Some(sc) = resources.swap_chains.get_mut(swap_chain) else {
            return logged("resize_swap_chain", Err(stale("swap chain", swap_chain)));
        };
        let desc = SwapChainDesc { width, height, ..sc.desc.clone() };
        // The old ring stays intact if the new one cannot be built
        let images = logged("resize_swap_chain", Self::swap_chain_images(resources, &self.shared.limits, &desc))?;
        if let Some(sc) = resources.swap_chains.get_mut(swap_chain) {
            for image in std::mem::replace(&mut sc.images, images) {
                resources.textures.remove(image);
            }
            sc.desc = desc;
            sc.current = 0;
        }
        rhi_info!(SOURCE, "Swap chain resized to {}x{}", width, height);
        Ok(())
    }

    fn set_vsync_mode(&self, swap_chain: SwapChainHandle, mode: VSyncMode) -> Result<()> {
        match self.resources().swap_chains.get_mut(swap_chain) {
            Some(sc) => {
                sc.vsync_mode = mode;
                Ok(())
            }
            None => logged("set_vsync_mode", Err(stale("swap chain", swap_chain))),
        }
    }

    fn destroy_swap_chain(&self, swap_chain: SwapChainHandle) {
        let mut resources = self.resources();
        match resources.swap_chains.remove(swap_chain) {
            Some(sc) => {
                for image in sc.images {
                    resources.textures.remove(image);
                }
            }
            None => rhi_trace!(SOURCE, "destroy_swap_chain: stale handle {:?}", swap_chain),
        }
    }

    fn wait_idle(&self) -> Result<()> {
        for queue in &self.queues {
            queue.wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for SoftwareDevice {
    fn drop(&mut self) {
        let _ = self.wait_idle();
        rhi_trace!(SOURCE, "Software device destroyed");
    }
}

#[cfg(test)]
#[path = "software_device_tests.rs"]
mod tests;

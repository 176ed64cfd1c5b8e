/// Command recording of the Vulkan backend
///
/// Each list owns a command pool with one primary command buffer, a query
/// pool with one slot per occlusion query and a private list of descriptor
/// pools for transient uniform sets. Vertex/index buffers, viewports and
/// scissors are recorded immediately. Pipeline and descriptor bindings are
/// flushed right before each draw or dispatch.
///
/// Framebuffers outlive their render pass: `end_render_pass` retires them and
/// they are destroyed at the next `begin` or when the list drops.

use std::any::Any;
use std::sync::Arc;
use ash::vk;
use rustc_hash::FxHashMap;
use ten_rhi::rhi::device::{
    AccelerationStructureDesc, BufferBarrier, BufferHandle, CommandList, CommandListState,
    DescriptorSetHandle, DescriptorSetLayoutDesc, DescriptorType, DispatchRaysDesc, IndexFormat,
    LoadOp, PipelineKind, PsoHandle, RecordingState, RenderPassBeginDesc, RenderPassHandle,
    ResourceState, ScissorRect, StoreOp, TextureBarrier, TextureFormat, TextureHandle,
    TextureRegion, Viewport, OCCLUSION_QUERY_COUNT,
};
use ten_rhi::{rhi_error, rhi_trace};

use crate::vulkan::VulkanShared;
use crate::vulkan_buffer::host_range;
use crate::vulkan_context::{lock, vk_err};
use crate::vulkan_descriptor_set::{apply, buffer_write, DescriptorPoolAllocator};
use crate::vulkan_format::{aspect_mask, index_format_to_vk, resource_state_to_vk};
use crate::vulkan_pipeline::build_graphics_pipeline;
use crate::vulkan_render_pass::{create_framebuffer, framebuffer_extent, implicit_desc};
use crate::vulkan_resources::VulkanResources;
use crate::vulkan_texture::{buffer_image_copy, validate_region};

const SOURCE: &str = "ten_rhi::vulkan::command_list";

/// Render pass instance currently open in the list
struct ActivePass {
    render_pass: vk::RenderPass,
    /// Pass object given to `begin_render_pass`, `None` for implicit passes
    explicit: Option<RenderPassHandle>,
    /// Color attachment count of each subpass
    subpass_colors: Vec<usize>,
}

/// Resources resolved by `begin_render_pass` before anything is recorded
struct PreparedPass {
    render_pass: vk::RenderPass,
    subpass_colors: Vec<usize>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

#[derive(Default)]
struct BoundState {
    pso: Option<PsoHandle>,
    /// Native pipeline last bound in the command buffer
    pipeline: vk::Pipeline,
    sets: FxHashMap<u32, DescriptorSetHandle>,
    /// Uniform buffers bound directly to slots of set 0
    uniforms: FxHashMap<u32, (BufferHandle, u64)>,
    descriptors_dirty: bool,
}

/// Vulkan command list
pub struct VulkanCommandList {
    pub(crate) shared: Arc<VulkanShared>,
    state: CommandListState,
    command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    query_pool: vk::QueryPool,
    /// One bit per occlusion query ended since `begin`
    ended_queries: u64,
    transient_sets: DescriptorPoolAllocator,
    pass: Option<ActivePass>,
    framebuffer: Option<vk::Framebuffer>,
    retired_framebuffers: Vec<vk::Framebuffer>,
    bound: BoundState,
}

impl VulkanCommandList {
    pub(crate) fn new(shared: Arc<VulkanShared>) -> ten_rhi::rhi::Result<Self> {
        let device = &shared.ctx.device;
        let (command_pool, command_buffer, query_pool, transient_sets) = unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(shared.ctx.queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| vk_err("Failed to create command pool", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = match device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(vk_err("Failed to allocate command buffer", e));
                }
            };

            let query_info = vk::QueryPoolCreateInfo::default()
                .query_type(vk::QueryType::OCCLUSION)
                .query_count(OCCLUSION_QUERY_COUNT);
            let query_pool = match device.create_query_pool(&query_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(vk_err("Failed to create occlusion query pool", e));
                }
            };

            let transient_sets = match DescriptorPoolAllocator::new(device, vk::DescriptorPoolCreateFlags::empty()) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_query_pool(query_pool, None);
                    device.destroy_command_pool(command_pool, None);
                    return Err(e);
                }
            };
            (command_pool, command_buffer, query_pool, transient_sets)
        };

        Ok(Self {
            shared,
            state: CommandListState::new(),
            command_pool,
            command_buffer,
            query_pool,
            ended_queries: 0,
            transient_sets,
            pass: None,
            framebuffer: None,
            retired_framebuffers: Vec::new(),
            bound: BoundState::default(),
        })
    }

    /// Samples counted by occlusion query `index` in the last submission
    ///
    /// `None` until the list was submitted with that query ended, and while
    /// the GPU has not produced the result yet.
    pub fn occlusion_result(&self, index: u32) -> Option<u64> {
        if index >= OCCLUSION_QUERY_COUNT
            || self.ended_queries & (1u64 << index) == 0
            || self.state.state() != RecordingState::Submitted
        {
            return None;
        }
        let mut data = [0u64; 1];
        let result = unsafe {
            self.shared.ctx.device.get_query_pool_results(
                self.query_pool,
                index,
                &mut data,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match result {
            Ok(()) => Some(data[0]),
            Err(vk::Result::NOT_READY) => None,
            Err(e) => {
                rhi_trace!(SOURCE, "occlusion query {} unavailable: {:?}", index, e);
                None
            }
        }
    }

    /// Number of descriptor pools holding transient uniform sets
    pub fn transient_pool_count(&self) -> usize {
        self.transient_sets.pool_count()
    }

    pub(crate) fn mark_submitted(&mut self) -> bool {
        self.state.submit()
    }

    pub(crate) fn cancel_submit(&mut self) -> bool {
        self.state.cancel_submit()
    }

    fn recording(&self, op: &str) -> bool {
        if !self.state.is_recording() {
            rhi_trace!(SOURCE, "{} ignored: list is {:?}", op, self.state.state());
            return false;
        }
        true
    }

    fn skip(&self, op: &str, reason: &str) {
        rhi_trace!(SOURCE, "{} skipped: {}", op, reason);
    }

    fn outside_render_pass(&self, op: &str) -> bool {
        if self.state.in_render_pass() {
            self.skip(op, "not allowed inside a render pass");
            return false;
        }
        true
    }

    fn destroy_framebuffers(&mut self) {
        let device = &self.shared.ctx.device;
        for framebuffer in self.retired_framebuffers.drain(..).chain(self.framebuffer.take()) {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
    }

    /// Bind the pipeline and descriptor sets a draw or dispatch needs
    ///
    /// Returns `false` (after tracing why) when the command must be skipped.
    fn flush(&mut self, op: &str, kind: PipelineKind) -> bool {
        let Some(pso_handle) = self.bound.pso else {
            self.skip(op, "no pipeline bound");
            return false;
        };
        let shared = Arc::clone(&self.shared);
        let device = &shared.ctx.device;
        let mut resources = lock(&shared.resources);
        let Some(pso) = resources.psos.get_mut(pso_handle) else {
            self.skip(op, "stale pipeline");
            return false;
        };
        if pso.kind != kind {
            self.skip(op, "bound pipeline has the wrong kind");
            return false;
        }

        let pipeline = match kind {
            PipelineKind::Compute => pso.pipelines.get(&(vk::RenderPass::null(), 0)).copied(),
            PipelineKind::Graphics => {
                let (Some(pass), Some(subpass)) = (self.pass.as_ref(), self.state.current_subpass()) else {
                    self.skip(op, "draw outside a render pass");
                    return false;
                };
                if let Some(explicit) = pso.render_pass {
                    if pass.explicit != Some(explicit) || pso.subpass != subpass {
                        self.skip(op, "pipeline was created for another render pass or subpass");
                        return false;
                    }
                }
                let key = (pass.render_pass, subpass);
                match pso.pipelines.get(&key) {
                    Some(&pipeline) => Some(pipeline),
                    None => {
                        let color_count = pass.subpass_colors.get(subpass as usize).copied().unwrap_or(0);
                        match build_graphics_pipeline(device, pso, pass.render_pass, subpass, color_count) {
                            Ok(pipeline) => {
                                pso.pipelines.insert(key, pipeline);
                                Some(pipeline)
                            }
                            Err(_) => None,
                        }
                    }
                }
            }
        };
        let Some(pipeline) = pipeline else {
            self.skip(op, "pipeline could not be built");
            return false;
        };

        let bind_point = pso.bind_point();
        let layout = pso.layout;
        if self.bound.pipeline != pipeline {
            unsafe { device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline) };
            self.bound.pipeline = pipeline;
        }

        if self.bound.descriptors_dirty {
            let schemas = pso.set_schemas.clone();
            let set_layouts = pso.set_layouts.clone();
            self.bind_descriptors(&resources, bind_point, layout, &schemas, &set_layouts);
            self.bound.descriptors_dirty = false;
        }
        true
    }

    fn bind_descriptors(
        &mut self,
        resources: &VulkanResources,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        schemas: &[Option<DescriptorSetLayoutDesc>],
        set_layouts: &[vk::DescriptorSetLayout],
    ) {
        for (&index, _) in self.bound.sets.iter().filter(|&(&index, _)| index as usize >= schemas.len()) {
            rhi_trace!(SOURCE, "descriptor set {} is not declared by the pipeline layout", index);
        }

        for (index, schema) in schemas.iter().enumerate() {
            let index = index as u32;
            let transient = match (index, schema) {
                (0, Some(schema)) if !self.bound.uniforms.is_empty() => {
                    self.transient_uniform_set(resources, schema, set_layouts[0])
                }
                _ => None,
            };
            let native = transient.or_else(|| {
                let handle = *self.bound.sets.get(&index)?;
                let set = resources.sets.get(handle).map(|set| set.set);
                if set.is_none() {
                    rhi_trace!(SOURCE, "descriptor set {:?} at index {} is stale", handle, index);
                }
                set
            });
            if let Some(set) = native {
                unsafe {
                    self.shared.ctx.device.cmd_bind_descriptor_sets(
                        self.command_buffer,
                        bind_point,
                        layout,
                        index,
                        &[set],
                        &[],
                    );
                }
            }
        }
    }

    /// Set 0 combining the bound set's slots with directly bound uniform buffers
    fn transient_uniform_set(
        &mut self,
        resources: &VulkanResources,
        schema: &DescriptorSetLayoutDesc,
        layout: vk::DescriptorSetLayout,
    ) -> Option<vk::DescriptorSet> {
        let device = &self.shared.ctx.device;
        let (set, _) = self.transient_sets.allocate(device, layout).ok()?;

        let mut copies = Vec::new();
        if let Some(bound) = self.bound.sets.get(&0).and_then(|&handle| resources.sets.get(handle)) {
            for &binding in bound.slots.keys() {
                if self.bound.uniforms.contains_key(&binding) {
                    continue;
                }
                let (Some(src), Some(dst)) = (bound.schema.find(binding), schema.find(binding)) else {
                    continue;
                };
                if src.ty == dst.ty {
                    copies.push(
                        vk::CopyDescriptorSet::default()
                            .src_set(bound.set)
                            .src_binding(binding)
                            .dst_set(set)
                            .dst_binding(binding)
                            .descriptor_count(1),
                    );
                }
            }
        }

        let mut writes = Vec::with_capacity(self.bound.uniforms.len());
        for (&slot, &(buffer, offset)) in &self.bound.uniforms {
            match schema.find(slot) {
                Some(binding) if binding.ty == DescriptorType::UniformBuffer => match resources.buffers.get(buffer) {
                    Some(record) => writes.push(buffer_write(slot, DescriptorType::UniformBuffer, record.buffer, offset, 0)),
                    None => rhi_trace!(SOURCE, "set_uniform_buffer: stale buffer at slot {}", slot),
                },
                Some(binding) => rhi_trace!(SOURCE, "set_uniform_buffer: slot {} is a {:?} binding", slot, binding.ty),
                None => rhi_trace!(SOURCE, "set_uniform_buffer: slot {} is not in the set 0 layout", slot),
            }
        }
        apply(device, set, &writes, &copies);
        Some(set)
    }

    fn set_pso(&mut self, op: &str, pso: PsoHandle, kind: PipelineKind) {
        if !self.recording(op) {
            return;
        }
        let bound_kind = lock(&self.shared.resources).psos.get(pso).map(|p| p.kind);
        match bound_kind {
            Some(found) if found == kind => {
                self.bound.pso = Some(pso);
                self.bound.descriptors_dirty = true;
            }
            Some(_) => self.skip(op, "pipeline kind mismatch"),
            None => self.skip(op, "stale pipeline"),
        }
    }

    /// Resolve attachments, the native pass and a framebuffer
    fn prepare_pass(
        &self,
        desc: &RenderPassBeginDesc,
        pass: Option<RenderPassHandle>,
    ) -> std::result::Result<PreparedPass, &'static str> {
        let device = &self.shared.ctx.device;
        let resources = lock(&self.shared.resources);

        let mut views = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut extents = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut colors: Vec<(TextureFormat, LoadOp, StoreOp)> = Vec::with_capacity(desc.color_attachments.len());
        for attachment in &desc.color_attachments {
            let texture = resources.textures.get(attachment.texture).ok_or("stale color attachment")?;
            views.push(texture.attachment_view);
            extents.push((texture.desc.width, texture.desc.height));
            colors.push((texture.desc.format, attachment.load_op, attachment.store_op));
        }
        let depth = match &desc.depth_stencil_attachment {
            Some(attachment) => {
                let texture = resources.textures.get(attachment.texture).ok_or("stale depth attachment")?;
                views.push(texture.attachment_view);
                extents.push((texture.desc.width, texture.desc.height));
                Some((texture.desc.format, attachment.load_op, attachment.store_op))
            }
            None => None,
        };

        let (render_pass, subpass_colors) = match pass {
            Some(handle) => {
                let record = resources.render_passes.get(handle).ok_or("stale render pass")?;
                let formats_match = record.desc.color_attachments.len() == colors.len()
                    && record
                        .desc
                        .color_attachments
                        .iter()
                        .zip(&colors)
                        .all(|(declared, bound)| declared.format == bound.0)
                    && record.desc.depth_stencil_attachment.map(|d| d.format) == depth.map(|d| d.0);
                if !formats_match {
                    return Err("attachments do not match the render pass formats");
                }
                let subpass_colors = record.desc.subpasses.iter().map(|s| s.color_attachments.len()).collect();
                (record.render_pass, subpass_colors)
            }
            None => {
                let implicit = implicit_desc(&colors, depth);
                let render_pass = lock(&self.shared.implicit_passes)
                    .get_or_create(device, &implicit)
                    .map_err(|_| "render pass creation failed")?;
                (render_pass, vec![colors.len()])
            }
        };
        drop(resources);

        let extent = framebuffer_extent(&extents);
        let framebuffer = create_framebuffer(device, render_pass, &views, extent)
            .map_err(|_| "framebuffer creation failed")?;
        Ok(PreparedPass { render_pass, subpass_colors, framebuffer, extent })
    }

    fn copy_target(&self, op: &str) -> bool {
        self.recording(op) && self.outside_render_pass(op)
    }
}

/// Clear values in attachment order: colors, then depth/stencil
pub(crate) fn clear_values(desc: &RenderPassBeginDesc) -> Vec<vk::ClearValue> {
    let mut values: Vec<vk::ClearValue> = desc
        .color_attachments
        .iter()
        .map(|attachment| vk::ClearValue {
            color: vk::ClearColorValue { float32: attachment.clear_color },
        })
        .collect();
    if let Some(depth) = &desc.depth_stencil_attachment {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: depth.clear_depth, stencil: depth.clear_stencil },
        });
    }
    values
}

pub(crate) fn vk_viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub(crate) fn vk_scissor(scissor: &ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: scissor.x, y: scissor.y },
        extent: vk::Extent2D { width: scissor.width, height: scissor.height },
    }
}

/// Layout a texture is in before a barrier
///
/// Swap chain images are never initialized, so their `Common` state means
/// "contents undefined".
pub(crate) fn texture_old_layout(swap_chain_image: bool, src_state: ResourceState) -> vk::ImageLayout {
    if swap_chain_image && src_state == ResourceState::Common {
        vk::ImageLayout::UNDEFINED
    } else {
        resource_state_to_vk(src_state).layout
    }
}

pub(crate) fn buffer_barrier(buffer: vk::Buffer, barrier: &BufferBarrier) -> vk::BufferMemoryBarrier<'static> {
    let size = if barrier.size == 0 { vk::WHOLE_SIZE } else { barrier.size };
    vk::BufferMemoryBarrier::default()
        .src_access_mask(resource_state_to_vk(barrier.src_state).access)
        .dst_access_mask(resource_state_to_vk(barrier.dst_state).access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(barrier.offset)
        .size(size)
}

/// Union of the stages of `states`, or `fallback` when there are none
pub(crate) fn barrier_stages(
    states: impl IntoIterator<Item = ResourceState>,
    fallback: vk::PipelineStageFlags,
) -> vk::PipelineStageFlags {
    let stages = states
        .into_iter()
        .fold(vk::PipelineStageFlags::empty(), |acc, state| acc | resource_state_to_vk(state).stages);
    if stages.is_empty() { fallback } else { stages }
}

impl CommandList for VulkanCommandList {
    fn state(&self) -> RecordingState {
        self.state.state()
    }

    fn begin(&mut self) {
        if self.state.is_recording() {
            rhi_trace!(SOURCE, "begin ignored: list is already recording");
            return;
        }
        self.destroy_framebuffers();
        let device = &self.shared.ctx.device;
        self.transient_sets.reset(device);
        unsafe {
            if let Err(e) = device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty()) {
                rhi_error!(SOURCE, "Failed to reset command buffer: {:?}", e);
                return;
            }
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            if let Err(e) = device.begin_command_buffer(self.command_buffer, &begin_info) {
                rhi_error!(SOURCE, "Failed to begin command buffer: {:?}", e);
                return;
            }
            device.cmd_reset_query_pool(self.command_buffer, self.query_pool, 0, OCCLUSION_QUERY_COUNT);
        }
        self.state.begin();
        self.pass = None;
        self.bound = BoundState::default();
        self.ended_queries = 0;
    }

    fn end(&mut self) {
        if !self.recording("end") {
            return;
        }
        if let Some(index) = self.state.active_query() {
            rhi_trace!(SOURCE, "end: closing occlusion query {} left open", index);
            self.end_occlusion_query(index);
        }
        if self.state.in_render_pass() {
            self.end_render_pass();
        }
        if let Err(e) = unsafe { self.shared.ctx.device.end_command_buffer(self.command_buffer) } {
            rhi_error!(SOURCE, "Failed to end command buffer: {:?}", e);
        }
        self.state.end();
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        if !self.recording("draw") || !self.flush("draw", PipelineKind::Graphics) {
            return;
        }
        unsafe {
            self.shared.ctx.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if !self.recording("draw_indexed") || !self.flush("draw_indexed", PipelineKind::Graphics) {
            return;
        }
        unsafe {
            self.shared.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if !self.recording("dispatch") {
            return;
        }
        if self.state.in_render_pass() {
            return self.skip("dispatch", "not allowed inside a render pass");
        }
        if !self.flush("dispatch", PipelineKind::Compute) {
            return;
        }
        unsafe { self.shared.ctx.device.cmd_dispatch(self.command_buffer, x, y, z) };
    }

    fn set_viewport(&mut self, first: u32, viewports: &[Viewport]) {
        if !self.recording("set_viewport") {
            return;
        }
        let Some(viewport) = viewports.first().filter(|_| first == 0) else {
            return self.skip("set_viewport", "only viewport 0 is supported");
        };
        if viewports.len() > 1 {
            rhi_trace!(SOURCE, "set_viewport: {} extra viewports dropped", viewports.len() - 1);
        }
        unsafe { self.shared.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport(viewport)]) };
    }

    fn set_scissor(&mut self, first: u32, scissors: &[ScissorRect]) {
        if !self.recording("set_scissor") {
            return;
        }
        let Some(scissor) = scissors.first().filter(|_| first == 0) else {
            return self.skip("set_scissor", "only scissor 0 is supported");
        };
        if scissors.len() > 1 {
            rhi_trace!(SOURCE, "set_scissor: {} extra scissors dropped", scissors.len() - 1);
        }
        unsafe { self.shared.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor(scissor)]) };
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64, _stride: u32) {
        if !self.recording("set_vertex_buffer") {
            return;
        }
        let native = lock(&self.shared.resources).buffers.get(buffer).map(|b| b.buffer);
        match native {
            Some(native) => unsafe {
                self.shared.ctx.device.cmd_bind_vertex_buffers(self.command_buffer, slot, &[native], &[offset]);
            },
            None => self.skip("set_vertex_buffer", "stale buffer"),
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if !self.recording("set_index_buffer") {
            return;
        }
        let native = lock(&self.shared.resources).buffers.get(buffer).map(|b| b.buffer);
        match native {
            Some(native) => unsafe {
                self.shared.ctx.device.cmd_bind_index_buffer(
                    self.command_buffer,
                    native,
                    offset,
                    index_format_to_vk(format),
                );
            },
            None => self.skip("set_index_buffer", "stale buffer"),
        }
    }

    fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if !self.recording("set_uniform_buffer") {
            return;
        }
        if !lock(&self.shared.resources).buffers.contains_key(buffer) {
            return self.skip("set_uniform_buffer", "stale buffer");
        }
        self.bound.uniforms.insert(slot, (buffer, offset));
        self.bound.descriptors_dirty = true;
    }

    fn set_graphics_pso(&mut self, pso: PsoHandle) {
        self.set_pso("set_graphics_pso", pso, PipelineKind::Graphics);
    }

    fn set_compute_pso(&mut self, pso: PsoHandle) {
        self.set_pso("set_compute_pso", pso, PipelineKind::Compute);
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle) {
        if !self.recording("bind_descriptor_set") {
            return;
        }
        if !lock(&self.shared.resources).sets.contains_key(set) {
            return self.skip("bind_descriptor_set", "stale descriptor set");
        }
        self.bound.sets.insert(set_index, set);
        self.bound.descriptors_dirty = true;
    }

    fn begin_render_pass(&mut self, desc: &RenderPassBeginDesc, pass: Option<RenderPassHandle>) {
        if !self.recording("begin_render_pass") {
            return;
        }
        if self.state.in_render_pass() {
            return self.skip("begin_render_pass", "a render pass is already open");
        }
        if let Err(e) = desc.validate() {
            return self.skip("begin_render_pass", &e.to_string());
        }
        let prepared = match self.prepare_pass(desc, pass) {
            Ok(prepared) => prepared,
            Err(reason) => return self.skip("begin_render_pass", reason),
        };

        let clear_values = clear_values(desc);
        let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: prepared.extent };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(prepared.render_pass)
            .framebuffer(prepared.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        let viewport = Viewport::from_extent(prepared.extent.width, prepared.extent.height);
        let device = &self.shared.ctx.device;
        unsafe {
            device.cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport(&viewport)]);
            device.cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }

        self.state.begin_render_pass(prepared.subpass_colors.len() as u32);
        self.framebuffer = Some(prepared.framebuffer);
        self.pass = Some(ActivePass {
            render_pass: prepared.render_pass,
            explicit: pass,
            subpass_colors: prepared.subpass_colors,
        });
    }

    fn next_subpass(&mut self) {
        if !self.recording("next_subpass") {
            return;
        }
        if self.state.next_subpass() {
            unsafe { self.shared.ctx.device.cmd_next_subpass(self.command_buffer, vk::SubpassContents::INLINE) };
        } else {
            self.skip("next_subpass", "no further subpass");
        }
    }

    fn end_render_pass(&mut self) {
        if !self.recording("end_render_pass") {
            return;
        }
        if self.state.end_render_pass() {
            unsafe { self.shared.ctx.device.cmd_end_render_pass(self.command_buffer) };
            self.retired_framebuffers.extend(self.framebuffer.take());
            self.pass = None;
        } else {
            self.skip("end_render_pass", "no render pass is open");
        }
    }

    fn current_subpass(&self) -> Option<u32> {
        self.state.current_subpass()
    }

    fn copy_buffer(&mut self, src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64) {
        if !self.copy_target("copy_buffer") {
            return;
        }
        let natives = {
            let resources = lock(&self.shared.resources);
            match (resources.buffers.get(src), resources.buffers.get(dst)) {
                (Some(s), Some(d)) => {
                    let fits = host_range(src_offset, size, s.desc.size).is_ok()
                        && host_range(dst_offset, size, d.desc.size).is_ok();
                    Some((s.buffer, d.buffer, fits))
                }
                _ => None,
            }
        };
        match natives {
            None => self.skip("copy_buffer", "stale buffer"),
            Some((_, _, false)) => self.skip("copy_buffer", "range exceeds a buffer"),
            Some(_) if size == 0 => self.skip("copy_buffer", "empty copy"),
            Some((s, d, true)) => unsafe {
                let region = vk::BufferCopy { src_offset, dst_offset, size };
                self.shared.ctx.device.cmd_copy_buffer(self.command_buffer, s, d, &[region]);
            },
        }
    }

    fn copy_buffer_to_texture(&mut self, src: BufferHandle, src_offset: u64, dst: TextureHandle, region: &TextureRegion) {
        if !self.copy_target("copy_buffer_to_texture") {
            return;
        }
        let copy = {
            let resources = lock(&self.shared.resources);
            let (Some(buffer), Some(texture)) = (resources.buffers.get(src), resources.textures.get(dst)) else {
                return self.skip("copy_buffer_to_texture", "stale buffer or texture");
            };
            let bytes = region.texel_count() * texture.desc.format.bytes_per_texel() as u64;
            if validate_region(&texture.desc, region).is_err() || host_range(src_offset, bytes, buffer.desc.size).is_err() {
                return self.skip("copy_buffer_to_texture", "region exceeds the buffer or texture");
            }
            (buffer.buffer, texture.image, buffer_image_copy(&texture.desc, src_offset, region))
        };
        unsafe {
            self.shared.ctx.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                copy.0,
                copy.1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy.2],
            );
        }
    }

    fn copy_texture_to_buffer(&mut self, src: TextureHandle, region: &TextureRegion, dst: BufferHandle, dst_offset: u64) {
        if !self.copy_target("copy_texture_to_buffer") {
            return;
        }
        let copy = {
            let resources = lock(&self.shared.resources);
            let (Some(texture), Some(buffer)) = (resources.textures.get(src), resources.buffers.get(dst)) else {
                return self.skip("copy_texture_to_buffer", "stale buffer or texture");
            };
            let bytes = region.texel_count() * texture.desc.format.bytes_per_texel() as u64;
            if validate_region(&texture.desc, region).is_err() || host_range(dst_offset, bytes, buffer.desc.size).is_err() {
                return self.skip("copy_texture_to_buffer", "region exceeds the buffer or texture");
            }
            (texture.image, buffer.buffer, buffer_image_copy(&texture.desc, dst_offset, region))
        };
        unsafe {
            self.shared.ctx.device.cmd_copy_image_to_buffer(
                self.command_buffer,
                copy.0,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                copy.1,
                &[copy.2],
            );
        }
    }

    fn resource_barrier(&mut self, buffer_barriers: &[BufferBarrier], texture_barriers: &[TextureBarrier]) {
        if !self.recording("resource_barrier") || !self.outside_render_pass("resource_barrier") {
            return;
        }
        let mut src_states = Vec::new();
        let mut dst_states = Vec::new();
        let (buffers, images) = {
            let resources = lock(&self.shared.resources);
            let mut buffers = Vec::with_capacity(buffer_barriers.len());
            for barrier in buffer_barriers {
                match resources.buffers.get(barrier.buffer) {
                    Some(record) => {
                        buffers.push(buffer_barrier(record.buffer, barrier));
                        src_states.push(barrier.src_state);
                        dst_states.push(barrier.dst_state);
                    }
                    None => rhi_trace!(SOURCE, "resource_barrier: stale buffer {:?}", barrier.buffer),
                }
            }
            let mut images = Vec::with_capacity(texture_barriers.len());
            for barrier in texture_barriers {
                let Some(record) = resources.textures.get(barrier.texture) else {
                    rhi_trace!(SOURCE, "resource_barrier: stale texture {:?}", barrier.texture);
                    continue;
                };
                if barrier.mip_level >= record.desc.mip_levels || barrier.array_layer >= record.desc.array_layers {
                    rhi_trace!(SOURCE, "resource_barrier: subresource out of range for {:?}", barrier.texture);
                    continue;
                }
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask(record.desc.format))
                    .base_mip_level(barrier.mip_level)
                    .level_count(1)
                    .base_array_layer(barrier.array_layer)
                    .layer_count(1);
                images.push(
                    vk::ImageMemoryBarrier::default()
                        .old_layout(texture_old_layout(record.swap_chain_image, barrier.src_state))
                        .new_layout(resource_state_to_vk(barrier.dst_state).layout)
                        .src_access_mask(resource_state_to_vk(barrier.src_state).access)
                        .dst_access_mask(resource_state_to_vk(barrier.dst_state).access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(record.image)
                        .subresource_range(range),
                );
                src_states.push(barrier.src_state);
                dst_states.push(barrier.dst_state);
            }
            (buffers, images)
        };
        if buffers.is_empty() && images.is_empty() {
            return self.skip("resource_barrier", "no live resource");
        }
        let src_stages = barrier_stages(src_states, vk::PipelineStageFlags::TOP_OF_PIPE);
        let dst_stages = barrier_stages(dst_states, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        unsafe {
            self.shared.ctx.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffers,
                &images,
            );
        }
    }

    fn begin_occlusion_query(&mut self, index: u32) {
        if !self.recording("begin_occlusion_query") {
            return;
        }
        if index >= OCCLUSION_QUERY_COUNT {
            return self.skip("begin_occlusion_query", "query index out of range");
        }
        if !self.state.begin_query(index) {
            return self.skip("begin_occlusion_query", "another occlusion query is active");
        }
        unsafe {
            self.shared.ctx.device.cmd_begin_query(
                self.command_buffer,
                self.query_pool,
                index,
                vk::QueryControlFlags::empty(),
            );
        }
    }

    fn end_occlusion_query(&mut self, index: u32) {
        if !self.recording("end_occlusion_query") {
            return;
        }
        if !self.state.end_query(index) {
            return self.skip("end_occlusion_query", "query is not active");
        }
        unsafe { self.shared.ctx.device.cmd_end_query(self.command_buffer, self.query_pool, index) };
        self.ended_queries |= 1u64 << index;
    }

    fn build_acceleration_structure(
        &mut self,
        _desc: &AccelerationStructureDesc,
        _scratch: BufferHandle,
        _result: BufferHandle,
    ) {
        if self.recording("build_acceleration_structure") && !self.shared.features.ray_tracing {
            self.skip("build_acceleration_structure", "ray tracing is not supported");
        }
    }

    fn dispatch_rays(&mut self, _desc: &DispatchRaysDesc) {
        if self.recording("dispatch_rays") && !self.shared.features.ray_tracing {
            self.skip("dispatch_rays", "ray tracing is not supported");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // The GPU may still execute the last submission
        if self.state.state() == RecordingState::Submitted {
            self.shared.ctx.wait_idle().ok();
        }
        self.destroy_framebuffers();
        let device = &self.shared.ctx.device;
        self.transient_sets.destroy(device);
        unsafe {
            device.destroy_query_pool(self.query_pool, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;

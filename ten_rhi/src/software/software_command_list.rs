/// Command recording of the software backend
///
/// A list records a `SoftwareCommand` stream. Handles are checked against the
/// device's object tables at record time so the worker only sees commands
/// that referenced live objects when they were recorded.

use std::any::Any;
use std::sync::Arc;
use crate::device::{
    AccelerationStructureDesc, BufferBarrier, BufferHandle, CommandList, CommandListState,
    DescriptorSetHandle, DispatchRaysDesc, IndexFormat, LoadOp, PipelineKind, PsoHandle,
    RecordingState, RenderPassBeginDesc, RenderPassHandle, ScissorRect, TextureBarrier,
    TextureFormat, TextureHandle, TextureRegion, Viewport, OCCLUSION_QUERY_COUNT,
};
use crate::software::software_device::SoftwareShared;
use crate::software::software_sync::lock;
use crate::rhi_trace;

const SOURCE: &str = "ten_rhi::software::command_list";

/// Attachment cleared or loaded when a pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FramebufferAttachment {
    pub texture: TextureHandle,
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub clear_color: [f32; 4],
    pub clear_stencil: u32,
}

/// Attachments of one render pass instance
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SoftwareFramebuffer {
    pub colors: Vec<FramebufferAttachment>,
    pub depth: Option<FramebufferAttachment>,
    pub subpass_count: u32,
}

/// One recorded command
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SoftwareCommand {
    SetViewport { first: u32, viewports: Vec<Viewport> },
    SetScissor { first: u32, scissors: Vec<ScissorRect> },
    SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: u64, stride: u32 },
    SetIndexBuffer { buffer: BufferHandle, offset: u64, format: IndexFormat },
    SetUniformBuffer { slot: u32, buffer: BufferHandle, offset: u64 },
    SetPso { pso: PsoHandle, kind: PipelineKind },
    BindDescriptorSet { set_index: u32, set: DescriptorSetHandle },
    BeginRenderPass(SoftwareFramebuffer),
    NextSubpass,
    EndRenderPass,
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
        /// `Some(vertex_offset)` for indexed draws
        indexed: Option<i32>,
    },
    Dispatch { x: u32, y: u32, z: u32 },
    CopyBuffer { src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64 },
    CopyBufferToTexture { src: BufferHandle, src_offset: u64, dst: TextureHandle, region: TextureRegion },
    CopyTextureToBuffer { src: TextureHandle, region: TextureRegion, dst: BufferHandle, dst_offset: u64 },
    Barrier { buffers: usize, textures: usize },
    BeginOcclusionQuery(u32),
    EndOcclusionQuery(u32),
}

/// Software command list
pub struct SoftwareCommandList {
    pub(crate) shared: Arc<SoftwareShared>,
    state: CommandListState,
    commands: Vec<SoftwareCommand>,
    transient_framebuffer: Option<SoftwareFramebuffer>,
}

impl SoftwareCommandList {
    pub(crate) fn new(shared: Arc<SoftwareShared>) -> Self {
        Self {
            shared,
            state: CommandListState::new(),
            commands: Vec::new(),
            transient_framebuffer: None,
        }
    }

    /// Number of commands recorded since the last `begin`
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Whether a render pass currently holds attachments
    pub fn has_transient_framebuffer(&self) -> bool {
        self.transient_framebuffer.is_some()
    }

    /// Hand the recorded stream to a queue (the list keeps its state)
    pub(crate) fn take_commands(&mut self) -> Vec<SoftwareCommand> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn mark_submitted(&mut self) -> bool {
        self.state.submit()
    }

    fn recording(&self, op: &str) -> bool {
        if !self.state.is_recording() {
            rhi_trace!(SOURCE, "{} ignored: list is {:?}", op, self.state.state());
            return false;
        }
        true
    }

    fn push(&mut self, op: &str, command: SoftwareCommand) {
        if self.recording(op) {
            self.commands.push(command);
        }
    }

    fn buffer_alive(&self, buffer: BufferHandle) -> bool {
        lock(&self.shared.resources).buffers.contains_key(buffer)
    }

    fn texture_alive(&self, texture: TextureHandle) -> bool {
        lock(&self.shared.resources).textures.contains_key(texture)
    }

    fn skip(&self, op: &str, reason: &str) {
        rhi_trace!(SOURCE, "{} skipped: {}", op, reason);
    }

    /// Resolve the attachments of a pass; `None` when a handle is stale or
    /// the explicit pass does not match them
    fn build_framebuffer(
        &self,
        desc: &RenderPassBeginDesc,
        pass: Option<RenderPassHandle>,
    ) -> Option<SoftwareFramebuffer> {
        let resources = lock(&self.shared.resources);
        let mut colors = Vec::with_capacity(desc.color_attachments.len());
        for attachment in &desc.color_attachments {
            let texture = resources.textures.get(attachment.texture)?;
            colors.push(FramebufferAttachment {
                texture: attachment.texture,
                format: texture.desc.format,
                load_op: attachment.load_op,
                clear_color: attachment.clear_color,
                clear_stencil: 0,
            });
        }
        let depth = match &desc.depth_stencil_attachment {
            Some(attachment) => {
                let texture = resources.textures.get(attachment.texture)?;
                Some(FramebufferAttachment {
                    texture: attachment.texture,
                    format: texture.desc.format,
                    load_op: attachment.load_op,
                    clear_color: [attachment.clear_depth, 0.0, 0.0, 0.0],
                    clear_stencil: attachment.clear_stencil,
                })
            }
            None => None,
        };
        let subpass_count = match pass {
            Some(handle) => {
                let pass_desc = resources.render_passes.get(handle)?;
                let formats_match = pass_desc.color_attachments.len() == colors.len()
                    && pass_desc
                        .color_attachments
                        .iter()
                        .zip(&colors)
                        .all(|(declared, bound)| declared.format == bound.format)
                    && pass_desc.depth_stencil_attachment.map(|d| d.format) == depth.map(|d| d.format);
                if !formats_match {
                    return None;
                }
                pass_desc.subpass_count()
            }
            None => 1,
        };
        Some(SoftwareFramebuffer { colors, depth, subpass_count })
    }
}

impl CommandList for SoftwareCommandList {
    fn state(&self) -> RecordingState {
        self.state.state()
    }

    fn begin(&mut self) {
        if !self.state.begin() {
            rhi_trace!(SOURCE, "begin ignored: list is already recording");
            return;
        }
        self.commands.clear();
        self.transient_framebuffer = None;
    }

    fn end(&mut self) {
        if !self.recording("end") {
            return;
        }
        if let Some(index) = self.state.active_query() {
            self.end_occlusion_query(index);
        }
        if self.state.in_render_pass() {
            self.end_render_pass();
        }
        self.state.end();
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(
            "draw",
            SoftwareCommand::Draw { vertex_count, instance_count, first_vertex, first_instance, indexed: None },
        );
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.push(
            "draw_indexed",
            SoftwareCommand::Draw {
                vertex_count: index_count,
                instance_count,
                first_vertex: first_index,
                first_instance,
                indexed: Some(vertex_offset),
            },
        );
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push("dispatch", SoftwareCommand::Dispatch { x, y, z });
    }

    fn set_viewport(&mut self, first: u32, viewports: &[Viewport]) {
        self.push("set_viewport", SoftwareCommand::SetViewport { first, viewports: viewports.to_vec() });
    }

    fn set_scissor(&mut self, first: u32, scissors: &[ScissorRect]) {
        self.push("set_scissor", SoftwareCommand::SetScissor { first, scissors: scissors.to_vec() });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64, stride: u32) {
        if !self.recording("set_vertex_buffer") {
            return;
        }
        if !self.buffer_alive(buffer) {
            return self.skip("set_vertex_buffer", "stale buffer");
        }
        self.commands.push(SoftwareCommand::SetVertexBuffer { slot, buffer, offset, stride });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        if !self.recording("set_index_buffer") {
            return;
        }
        if !self.buffer_alive(buffer) {
            return self.skip("set_index_buffer", "stale buffer");
        }
        self.commands.push(SoftwareCommand::SetIndexBuffer { buffer, offset, format });
    }

    fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        if !self.recording("set_uniform_buffer") {
            return;
        }
        if !self.buffer_alive(buffer) {
            return self.skip("set_uniform_buffer", "stale buffer");
        }
        self.commands.push(SoftwareCommand::SetUniformBuffer { slot, buffer, offset });
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
        self.commands.push(SoftwareCommand::BindDescriptorSet { set_index, set });
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
        let framebuffer = match self.build_framebuffer(desc, pass) {
            Some(framebuffer) => framebuffer,
            None => return self.skip("begin_render_pass", "stale attachment or mismatched render pass"),
        };
        self.state.begin_render_pass(framebuffer.subpass_count);
        self.commands.push(SoftwareCommand::BeginRenderPass(framebuffer.clone()));
        self.transient_framebuffer = Some(framebuffer);
    }

    fn next_subpass(&mut self) {
        if !self.recording("next_subpass") {
            return;
        }
        if self.state.next_subpass() {
            self.commands.push(SoftwareCommand::NextSubpass);
        } else {
            self.skip("next_subpass", "no further subpass");
        }
    }

    fn end_render_pass(&mut self) {
        if !self.recording("end_render_pass") {
            return;
        }
        if self.state.end_render_pass() {
            self.commands.push(SoftwareCommand::EndRenderPass);
            self.transient_framebuffer = None;
        } else {
            self.skip("end_render_pass", "no render pass is open");
        }
    }

    fn current_subpass(&self) -> Option<u32> {
        self.state.current_subpass()
    }

    fn copy_buffer(&mut self, src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64) {
        if !self.recording("copy_buffer") {
            return;
        }
        if !self.buffer_alive(src) || !self.buffer_alive(dst) {
            return self.skip("copy_buffer", "stale buffer");
        }
        self.commands.push(SoftwareCommand::CopyBuffer { src, src_offset, dst, dst_offset, size });
    }

    fn copy_buffer_to_texture(&mut self, src: BufferHandle, src_offset: u64, dst: TextureHandle, region: &TextureRegion) {
        if !self.recording("copy_buffer_to_texture") {
            return;
        }
        if !self.buffer_alive(src) || !self.texture_alive(dst) {
            return self.skip("copy_buffer_to_texture", "stale buffer or texture");
        }
        self.commands.push(SoftwareCommand::CopyBufferToTexture { src, src_offset, dst, region: *region });
    }

    fn copy_texture_to_buffer(&mut self, src: TextureHandle, region: &TextureRegion, dst: BufferHandle, dst_offset: u64) {
        if !self.recording("copy_texture_to_buffer") {
            return;
        }
        if !self.texture_alive(src) || !self.buffer_alive(dst) {
            return self.skip("copy_texture_to_buffer", "stale buffer or texture");
        }
        self.commands.push(SoftwareCommand::CopyTextureToBuffer { src, region: *region, dst, dst_offset });
    }

    fn resource_barrier(&mut self, buffer_barriers: &[BufferBarrier], texture_barriers: &[TextureBarrier]) {
        if !self.recording("resource_barrier") {
            return;
        }
        let (buffers, textures) = {
            let resources = lock(&self.shared.resources);
            (
                buffer_barriers.iter().filter(|b| resources.buffers.contains_key(b.buffer)).count(),
                texture_barriers.iter().filter(|t| resources.textures.contains_key(t.texture)).count(),
            )
        };
        if buffers + textures == 0 {
            return self.skip("resource_barrier", "no live resource");
        }
        self.commands.push(SoftwareCommand::Barrier { buffers, textures });
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
        self.commands.push(SoftwareCommand::BeginOcclusionQuery(index));
    }

    fn end_occlusion_query(&mut self, index: u32) {
        if !self.recording("end_occlusion_query") {
            return;
        }
        if !self.state.end_query(index) {
            return self.skip("end_occlusion_query", "query is not active");
        }
        self.commands.push(SoftwareCommand::EndOcclusionQuery(index));
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

impl SoftwareCommandList {
    fn set_pso(&mut self, op: &str, pso: PsoHandle, kind: PipelineKind) {
        if !self.recording(op) {
            return;
        }
        let bound_kind = lock(&self.shared.resources).psos.get(pso).map(|p| p.kind);
        match bound_kind {
            Some(found) if found == kind => self.commands.push(SoftwareCommand::SetPso { pso, kind }),
            Some(_) => self.skip(op, "pipeline kind mismatch"),
            None => self.skip(op, "stale pipeline"),
        }
    }
}

#[cfg(test)]
#[path = "software_command_list_tests.rs"]
mod tests;

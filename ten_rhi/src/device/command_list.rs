/// CommandList trait - records GPU work for later submission
///
/// Recording calls never fail. While the list is not recording, or when a
/// call references a stale handle, the call is skipped and traced.

use std::any::Any;
use crate::device::{
    AccelerationStructureDesc, BufferBarrier, BufferHandle, DescriptorSetHandle,
    DispatchRaysDesc, IndexFormat, PsoHandle, RenderPassBeginDesc, RenderPassHandle,
    TextureBarrier, TextureHandle, OCCLUSION_QUERY_COUNT,
};

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with depth range [0, 1]
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self { x: 0.0, y: 0.0, width: width as f32, height: height as f32, min_depth: 0.0, max_depth: 1.0 }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Texture subresource box used by buffer/texture copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub array_layer: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl TextureRegion {
    /// Whole mip 0 of layer 0
    pub fn full(width: u32, height: u32) -> Self {
        Self { mip_level: 0, array_layer: 0, x: 0, y: 0, z: 0, width, height, depth: 1 }
    }

    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

/// Lifecycle of a command list
///
/// `NotRecording -> begin -> Recording -> end -> Executable -> submit -> Submitted`.
/// `begin` is accepted from every state except `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    NotRecording,
    Recording,
    /// Ended and ready to submit
    Executable,
    /// Handed to a queue; reuse only after its fence completed
    Submitted,
}

/// Open render pass inside a recording list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenPass {
    subpass: u32,
    subpass_count: u32,
}

/// State machine shared by every backend's command list
///
/// Backends call the transition methods first and only touch native state
/// when they return `true`.
///
/// At most one occlusion query is active at a time, and it is ended with the
/// index it was begun with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandListState {
    state: RecordingState,
    pass: Option<OpenPass>,
    query: Option<u32>,
}

impl Default for CommandListState {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandListState {
    pub fn new() -> Self {
        Self { state: RecordingState::NotRecording, pass: None, query: None }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Open for recording; `false` when already recording
    pub fn begin(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        self.state = RecordingState::Recording;
        self.pass = None;
        self.query = None;
        true
    }

    /// Close recording; `false` when not recording
    ///
    /// The caller must close an open render pass and an active query first
    /// (see `in_render_pass` and `active_query`).
    pub fn end(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.state = RecordingState::Executable;
        self.pass = None;
        self.query = None;
        true
    }

    /// Mark as handed to a queue; `false` unless the list is executable
    pub fn submit(&mut self) -> bool {
        if self.state != RecordingState::Executable {
            return false;
        }
        self.state = RecordingState::Submitted;
        true
    }

    /// Undo `submit` after the queue rejected the work; `false` unless submitted
    pub fn cancel_submit(&mut self) -> bool {
        if self.state != RecordingState::Submitted {
            return false;
        }
        self.state = RecordingState::Executable;
        true
    }

    /// Start occlusion query `index`; `false` when out of range or another query is active
    pub fn begin_query(&mut self, index: u32) -> bool {
        if !self.is_recording() || index >= OCCLUSION_QUERY_COUNT || self.query.is_some() {
            return false;
        }
        self.query = Some(index);
        true
    }

    /// Stop occlusion query `index`; `false` unless it is the active one
    pub fn end_query(&mut self, index: u32) -> bool {
        if !self.is_recording() || self.query != Some(index) {
            return false;
        }
        self.query = None;
        true
    }

    pub fn active_query(&self) -> Option<u32> {
        self.query
    }

    pub fn in_render_pass(&self) -> bool {
        self.pass.is_some()
    }

    /// Enter a pass with `subpass_count` subpasses; `false` when not recording or already inside one
    pub fn begin_render_pass(&mut self, subpass_count: u32) -> bool {
        if !self.is_recording() || self.pass.is_some() || subpass_count == 0 {
            return false;
        }
        self.pass = Some(OpenPass { subpass: 0, subpass_count });
        true
    }

    /// Advance to the next subpass; `false` past the last one
    pub fn next_subpass(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        match &mut self.pass {
            Some(pass) if pass.subpass + 1 < pass.subpass_count => {
                pass.subpass += 1;
                true
            }
            _ => false,
        }
    }

    /// Leave the open pass; `false` when none is open
    pub fn end_render_pass(&mut self) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.pass.take().is_some()
    }

    pub fn current_subpass(&self) -> Option<u32> {
        self.pass.map(|p| p.subpass)
    }
}

/// Command list for recording GPU work
///
/// A list belongs to one thread while recording. It is submitted through
/// `Queue::submit` and must not be reset with `begin` until the fence of that
/// submission has completed.
pub trait CommandList: Send {
    /// Current lifecycle state
    fn state(&self) -> RecordingState;

    /// Reset the list's storage and open it for recording (ignored while recording)
    fn begin(&mut self);

    /// Close recording (ignored while not recording); closes an open render pass
    fn end(&mut self);

    /// Draw non-indexed primitives
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Draw indexed primitives from the bound index buffer
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Dispatch compute work groups with the bound compute PSO
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Set viewports starting at index `first`
    fn set_viewport(&mut self, first: u32, viewports: &[Viewport]);

    /// Set scissor rectangles starting at index `first`
    fn set_scissor(&mut self, first: u32, scissors: &[ScissorRect]);

    /// Bind a vertex buffer slot
    ///
    /// # Arguments
    ///
    /// * `slot` - Vertex buffer binding index
    /// * `buffer` - Buffer to bind
    /// * `offset` - Offset into the buffer in bytes
    /// * `stride` - Vertex stride (informational for backends with strides baked into the PSO)
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64, stride: u32);

    /// Bind the index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Bind a uniform buffer directly to a slot of descriptor set 0
    fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Bind a graphics PSO
    fn set_graphics_pso(&mut self, pso: PsoHandle);

    /// Bind a compute PSO
    fn set_compute_pso(&mut self, pso: PsoHandle);

    /// Bind a descriptor set at `set_index` for the currently bound PSO
    ///
    /// The set must come from the layout the PSO was built with at that index.
    /// No structural check is performed.
    fn bind_descriptor_set(&mut self, set_index: u32, set: DescriptorSetHandle);

    /// Begin a render pass
    ///
    /// # Arguments
    ///
    /// * `desc` - 1..=8 color attachments and an optional depth/stencil attachment
    /// * `pass` - Explicit pass object (subpass-aware); `None` infers a single-subpass pass
    fn begin_render_pass(&mut self, desc: &RenderPassBeginDesc, pass: Option<RenderPassHandle>);

    /// Advance to the next subpass (no-op past the last)
    fn next_subpass(&mut self);

    /// End the render pass and release its transient framebuffer
    fn end_render_pass(&mut self);

    /// Index of the current subpass, `None` outside a render pass
    fn current_subpass(&self) -> Option<u32>;

    /// Copy `size` bytes between buffers
    fn copy_buffer(&mut self, src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64);

    /// Copy tightly packed texels from a buffer into a texture region
    fn copy_buffer_to_texture(&mut self, src: BufferHandle, src_offset: u64, dst: TextureHandle, region: &TextureRegion);

    /// Copy a texture region into a buffer as tightly packed texels
    fn copy_texture_to_buffer(&mut self, src: TextureHandle, region: &TextureRegion, dst: BufferHandle, dst_offset: u64);

    /// Declare resource state transitions
    fn resource_barrier(&mut self, buffer_barriers: &[BufferBarrier], texture_barriers: &[TextureBarrier]);

    /// Start counting samples for occlusion query `index`
    fn begin_occlusion_query(&mut self, index: u32);

    fn end_occlusion_query(&mut self, index: u32);

    /// Build an acceleration structure (no-op without hardware ray tracing)
    fn build_acceleration_structure(
        &mut self,
        desc: &AccelerationStructureDesc,
        scratch: BufferHandle,
        result: BufferHandle,
    );

    /// Launch rays (no-op without hardware ray tracing)
    fn dispatch_rays(&mut self, desc: &DispatchRaysDesc);

    /// Downcast hook for the owning backend's queue
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
#[path = "command_list_tests.rs"]
mod tests;

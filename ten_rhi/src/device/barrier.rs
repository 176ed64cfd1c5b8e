/// Resource states and explicit barriers
///
/// Nothing tracks the current state of a buffer or texture. The caller keeps
/// it and declares every transition with `CommandList::resource_barrier`.

use crate::device::{BufferHandle, TextureHandle};

/// Logical state a buffer or texture is in for the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    VertexBuffer,
    IndexBuffer,
    RenderTarget,
    DepthWrite,
    ShaderResource,
    CopySrc,
    CopyDst,
    Present,
}

impl ResourceState {
    /// True when the state allows GPU writes
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget | ResourceState::DepthWrite | ResourceState::CopyDst
        )
    }
}

/// Transition of a buffer range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub offset: u64,
    /// Byte count; 0 means "to the end of the buffer"
    pub size: u64,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
}

impl BufferBarrier {
    /// Whole-buffer transition
    pub fn whole(buffer: BufferHandle, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self { buffer, offset: 0, size: 0, src_state, dst_state }
    }
}

/// Transition of one texture subresource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub mip_level: u32,
    pub array_layer: u32,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
}

impl TextureBarrier {
    /// Transition of mip 0, layer 0
    pub fn new(texture: TextureHandle, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self { texture, mip_level: 0, array_layer: 0, src_state, dst_state }
    }
}

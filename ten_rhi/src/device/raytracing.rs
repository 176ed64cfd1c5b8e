/// Ray tracing descriptors
///
/// Backends without hardware ray tracing report `DeviceFeatures::ray_tracing == false`
/// and ignore the related command list calls.

use crate::device::BufferHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelerationStructureType {
    TopLevel,
    BottomLevel,
}

/// Triangle geometry for a bottom-level structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaytracingGeometryDesc {
    pub vertex_buffer: BufferHandle,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    /// `None` for non-indexed geometry
    pub index_buffer: Option<BufferHandle>,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelerationStructureDesc {
    pub ty: AccelerationStructureType,
    pub geometries: Vec<RaytracingGeometryDesc>,
    /// Instance count for a top-level structure
    pub instance_count: u32,
}

/// Launch size of `CommandList::dispatch_rays`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchRaysDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

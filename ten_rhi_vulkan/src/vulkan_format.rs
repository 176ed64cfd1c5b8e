/// Conversions from RHI enums and flags to their Vulkan counterparts
///
/// Every function here is pure so the mappings can be tested without a GPU.

use ash::vk;
use ten_rhi::rhi::device::{
    AddressMode, BlendFactor, BlendOp, BufferUsage, ColorSpace, CompareOp, CullMode,
    DescriptorType, Filter, FrontFace, IndexFormat, LoadOp, MemoryLocation, PresentMode,
    PrimitiveTopology, ResourceState, ShaderStageFlags, StoreOp, TextureFormat, TextureUsage,
    VertexFormat, VertexInputRate,
};

pub(crate) fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8_UNORM => vk::Format::R8_UNORM,
        TextureFormat::R8G8_UNORM => vk::Format::R8G8_UNORM,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        TextureFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D16_UNORM => vk::Format::D16_UNORM,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
    }
}

/// Reverse mapping used for surface formats reported by the driver
pub(crate) fn texture_format_from_vk(format: vk::Format) -> Option<TextureFormat> {
    let format = match format {
        vk::Format::R8_UNORM => TextureFormat::R8_UNORM,
        vk::Format::R8G8_UNORM => TextureFormat::R8G8_UNORM,
        vk::Format::R8G8B8A8_UNORM => TextureFormat::R8G8B8A8_UNORM,
        vk::Format::R8G8B8A8_SRGB => TextureFormat::R8G8B8A8_SRGB,
        vk::Format::B8G8R8A8_UNORM => TextureFormat::B8G8R8A8_UNORM,
        vk::Format::B8G8R8A8_SRGB => TextureFormat::B8G8R8A8_SRGB,
        vk::Format::R16G16B16A16_SFLOAT => TextureFormat::R16G16B16A16_SFLOAT,
        vk::Format::R32_SFLOAT => TextureFormat::R32_SFLOAT,
        vk::Format::R32G32B32A32_SFLOAT => TextureFormat::R32G32B32A32_SFLOAT,
        vk::Format::D16_UNORM => TextureFormat::D16_UNORM,
        vk::Format::D24_UNORM_S8_UINT => TextureFormat::D24_UNORM_S8_UINT,
        vk::Format::D32_SFLOAT => TextureFormat::D32_FLOAT,
        _ => return None,
    };
    Some(format)
}

/// Image aspect touched by views, barriers and copies of a format
pub(crate) fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        VertexFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        VertexFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::R32_UINT => vk::Format::R32_UINT,
        VertexFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
    }
}

pub(crate) fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub(crate) fn index_format_to_vk(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

pub(crate) fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

pub(crate) fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

/// R=1, G=2, B=4, A=8 matches the Vulkan bit layout
pub(crate) fn color_write_mask_to_vk(mask: u8) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw(u32::from(mask & 0xF))
}

pub(crate) fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub(crate) fn load_op_to_vk(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op_to_vk(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Vulkan descriptor type of a layout binding
///
/// `UnorderedAccess` maps to a storage buffer; storage images are not exposed.
pub(crate) fn descriptor_type_to_vk(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::ShaderResource => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::UnorderedAccess => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub(crate) fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStageFlags::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

pub(crate) fn texture_usage_to_vk(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

pub(crate) fn memory_location_to_gpu_allocator(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::DeviceLocal => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::HostVisible => gpu_allocator::MemoryLocation::CpuToGpu,
    }
}

/// Access, pipeline stages and image layout a resource state stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateAccess {
    pub access: vk::AccessFlags,
    pub stages: vk::PipelineStageFlags,
    pub layout: vk::ImageLayout,
}

pub(crate) fn resource_state_to_vk(state: ResourceState) -> StateAccess {
    let (access, stages, layout) = match state {
        ResourceState::Common => (
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::ImageLayout::GENERAL,
        ),
        ResourceState::VertexBuffer => (
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::ImageLayout::GENERAL,
        ),
        ResourceState::IndexBuffer => (
            vk::AccessFlags::INDEX_READ,
            vk::PipelineStageFlags::VERTEX_INPUT,
            vk::ImageLayout::GENERAL,
        ),
        ResourceState::RenderTarget => (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        ResourceState::DepthWrite => (
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        ResourceState::ShaderResource => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        ResourceState::CopySrc => (
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ),
        ResourceState::CopyDst => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        ResourceState::Present => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
    };
    StateAccess { access, stages, layout }
}

pub(crate) fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
    }
}

/// Requested present mode when the surface supports it, FIFO otherwise
///
/// FIFO is the only mode every Vulkan surface must support.
pub(crate) fn choose_present_mode(requested: PresentMode, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let wanted = present_mode_to_vk(requested);
    if available.contains(&wanted) {
        wanted
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub(crate) fn color_space_to_vk(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SRGB => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::HDR10_ST2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpace::HDR10_HLG => vk::ColorSpaceKHR::HDR10_HLG_EXT,
        ColorSpace::scRGB => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        ColorSpace::DisplayNative => vk::ColorSpaceKHR::DISPLAY_NATIVE_AMD,
    }
}

/// Pick the surface format for a swap chain
///
/// Preference order: requested format in the requested color space, then the
/// requested format in sRGB, then any RHI-known format in sRGB, then the first
/// reported format. Returns the chosen format and the color space it implies.
pub(crate) fn choose_surface_format(
    format: TextureFormat,
    color_space: ColorSpace,
    available: &[vk::SurfaceFormatKHR],
) -> Option<(vk::SurfaceFormatKHR, ColorSpace)> {
    let wanted_format = texture_format_to_vk(format);
    let wanted_space = color_space_to_vk(color_space);
    if let Some(found) = available
        .iter()
        .find(|f| f.format == wanted_format && f.color_space == wanted_space)
    {
        return Some((*found, color_space));
    }
    let srgb = vk::ColorSpaceKHR::SRGB_NONLINEAR;
    available
        .iter()
        .find(|f| f.format == wanted_format && f.color_space == srgb)
        .or_else(|| {
            available
                .iter()
                .find(|f| f.color_space == srgb && texture_format_from_vk(f.format).is_some())
        })
        .or_else(|| available.first())
        .map(|f| (*f, ColorSpace::SRGB))
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;

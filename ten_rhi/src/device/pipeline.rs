/// Pipeline state object descriptors
///
/// Shader code is consumed as opaque backend-native bytecode (SPIR-V for
/// Vulkan). Nothing here compiles shaders.

use crate::error::{Error, Result};

/// Maximum number of per-attachment blend states
pub const MAX_BLEND_ATTACHMENTS: usize = 8;

/// Opaque shader bytecode blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderBytecode(pub Vec<u8>);

impl ShaderBytecode {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ShaderBytecode {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ShaderBytecode {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Blend factor for color/alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Depth/stencil comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Per-attachment color blend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendAttachmentDesc {
    pub blend_enable: bool,
    pub src_color_blend: BlendFactor,
    pub dst_color_blend: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend: BlendFactor,
    pub dst_alpha_blend: BlendFactor,
    pub alpha_blend_op: BlendOp,
    /// R=1, G=2, B=4, A=8
    pub color_write_mask: u8,
}

impl Default for BlendAttachmentDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend: BlendFactor::SrcAlpha,
            dst_color_blend: BlendFactor::OneMinusSrcAlpha,
            color_blend_op: BlendOp::Add,
            src_alpha_blend: BlendFactor::One,
            dst_alpha_blend: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: 0xF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateDesc {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
}

impl Default for DepthStencilStateDesc {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationStateDesc {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for RasterizationStateDesc {
    fn default() -> Self {
        Self { cull_mode: CullMode::Back, front_face: FrontFace::CounterClockwise }
    }
}

/// Fixed-function state of a graphics pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphicsPipelineStateDesc {
    /// One entry per color attachment (at most 8); empty means one default entry per attachment
    pub blend_attachments: Vec<BlendAttachmentDesc>,
    pub depth_stencil: DepthStencilStateDesc,
    pub rasterization: RasterizationStateDesc,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VertexFormat {
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,
    R8G8B8A8_UNORM,
}

impl VertexFormat {
    pub fn size_bytes(self) -> u32 {
        match self {
            VertexFormat::R32_SFLOAT | VertexFormat::R32_UINT | VertexFormat::R8G8B8A8_UNORM => 4,
            VertexFormat::R32G32_SFLOAT => 8,
            VertexFormat::R32G32B32_SFLOAT => 12,
            VertexFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    /// Data is per-vertex
    Vertex,
    /// Data is per-instance
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    /// Binding index
    pub binding: u32,
    pub format: VertexFormat,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

/// Vertex binding description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout (empty for vertex-pulling shaders)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

/// Descriptor for a graphics PSO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphicsPsoDesc {
    pub vertex_shader: ShaderBytecode,
    pub fragment_shader: ShaderBytecode,
    /// `None` means backend defaults
    pub pipeline_state: Option<GraphicsPipelineStateDesc>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
}

impl GraphicsPsoDesc {
    /// Check shader presence and state counts
    ///
    /// Render pass and subpass checks need the backend's render pass table
    /// and happen in `Device::create_graphics_pso`.
    pub fn validate(&self) -> Result<()> {
        if self.vertex_shader.is_empty() && self.fragment_shader.is_empty() {
            return Err(Error::InvalidArgument(
                "graphics PSO needs vertex or fragment bytecode".to_string(),
            ));
        }
        if let Some(state) = &self.pipeline_state {
            if state.blend_attachments.len() > MAX_BLEND_ATTACHMENTS {
                return Err(Error::InvalidArgument(format!(
                    "{} blend attachments exceed the maximum of {}",
                    state.blend_attachments.len(),
                    MAX_BLEND_ATTACHMENTS
                )));
            }
        }
        for attribute in &self.vertex_layout.attributes {
            if !self.vertex_layout.bindings.iter().any(|b| b.binding == attribute.binding) {
                return Err(Error::InvalidArgument(format!(
                    "vertex attribute at location {} references undeclared binding {}",
                    attribute.location, attribute.binding
                )));
            }
        }
        Ok(())
    }

    /// Fixed-function state actually used (defaults when none was given)
    pub fn state_or_default(&self) -> GraphicsPipelineStateDesc {
        self.pipeline_state.clone().unwrap_or_default()
    }
}

/// Descriptor for a compute PSO
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputePsoDesc {
    pub compute_shader: ShaderBytecode,
}

impl ComputePsoDesc {
    pub fn validate(&self) -> Result<()> {
        if self.compute_shader.is_empty() {
            return Err(Error::InvalidArgument("compute PSO needs compute bytecode".to_string()));
        }
        Ok(())
    }
}

/// Kind of a created PSO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

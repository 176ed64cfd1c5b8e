//! Unit tests for pipeline.rs
//!
//! Tests PSO descriptor validation and fixed-function defaults.

use crate::device::{
    BlendAttachmentDesc, BlendFactor, CompareOp, ComputePsoDesc, CullMode, FrontFace,
    GraphicsPipelineStateDesc, GraphicsPsoDesc, ShaderBytecode, VertexAttribute,
    VertexBinding, VertexFormat, VertexInputRate, VertexLayout,
};

fn blob() -> ShaderBytecode {
    ShaderBytecode::new(vec![0u8; 32])
}

// ============================================================================
// GRAPHICS PSO VALIDATION
// ============================================================================

#[test]
fn test_graphics_pso_needs_some_shader() {
    let desc = GraphicsPsoDesc::default();
    assert!(desc.validate().unwrap_err().is_invalid_argument());
}

#[test]
fn test_graphics_pso_vertex_only_is_valid() {
    let desc = GraphicsPsoDesc { vertex_shader: blob(), ..Default::default() };
    assert!(desc.validate().is_ok());
}

#[test]
fn test_graphics_pso_fragment_only_is_valid() {
    let desc = GraphicsPsoDesc { fragment_shader: blob(), ..Default::default() };
    assert!(desc.validate().is_ok());
}

#[test]
fn test_graphics_pso_rejects_too_many_blend_attachments() {
    let desc = GraphicsPsoDesc {
        vertex_shader: blob(),
        pipeline_state: Some(GraphicsPipelineStateDesc {
            blend_attachments: vec![BlendAttachmentDesc::default(); 9],
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(desc.validate().is_err());
}

#[test]
fn test_graphics_pso_rejects_attribute_without_binding() {
    let desc = GraphicsPsoDesc {
        vertex_shader: blob(),
        vertex_layout: VertexLayout {
            bindings: vec![VertexBinding { binding: 0, stride: 12, input_rate: VertexInputRate::Vertex }],
            attributes: vec![VertexAttribute {
                location: 0,
                binding: 1,
                format: VertexFormat::R32G32B32_SFLOAT,
                offset: 0,
            }],
        },
        ..Default::default()
    };
    assert!(desc.validate().is_err());
}

// ============================================================================
// COMPUTE PSO VALIDATION
// ============================================================================

#[test]
fn test_compute_pso_needs_bytecode() {
    assert!(ComputePsoDesc::default().validate().is_err());
    assert!(ComputePsoDesc { compute_shader: blob() }.validate().is_ok());
}

// ============================================================================
// DEFAULTS
// ============================================================================

#[test]
fn test_blend_attachment_defaults() {
    let blend = BlendAttachmentDesc::default();
    assert!(!blend.blend_enable);
    assert_eq!(blend.src_color_blend, BlendFactor::SrcAlpha);
    assert_eq!(blend.dst_color_blend, BlendFactor::OneMinusSrcAlpha);
    assert_eq!(blend.color_write_mask, 0xF);
}

#[test]
fn test_state_or_default() {
    let desc = GraphicsPsoDesc { vertex_shader: blob(), ..Default::default() };
    let state = desc.state_or_default();
    assert!(state.depth_stencil.depth_test_enable);
    assert_eq!(state.depth_stencil.depth_compare_op, CompareOp::Less);
    assert_eq!(state.rasterization.cull_mode, CullMode::Back);
    assert_eq!(state.rasterization.front_face, FrontFace::CounterClockwise);
}

#[test]
fn test_vertex_format_sizes() {
    assert_eq!(VertexFormat::R32_SFLOAT.size_bytes(), 4);
    assert_eq!(VertexFormat::R32G32B32_SFLOAT.size_bytes(), 12);
    assert_eq!(VertexFormat::R32G32B32A32_SFLOAT.size_bytes(), 16);
    assert_eq!(VertexFormat::R8G8B8A8_UNORM.size_bytes(), 4);
}

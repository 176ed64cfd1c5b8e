//! Unit tests for SPIR-V checks, layout schemas and blend states (no GPU required)

use super::*;
use ten_rhi::rhi::device::{BlendFactor, DescriptorSetLayoutBinding, DescriptorType};

fn header_only_module() -> Vec<u8> {
    [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect()
}

fn schema(bindings: &[u32]) -> DescriptorSetLayoutDesc {
    DescriptorSetLayoutDesc::new(
        bindings
            .iter()
            .map(|&binding| DescriptorSetLayoutBinding::new(binding, DescriptorType::UniformBuffer))
            .collect(),
    )
}

// ============================================================================
// SPIR-V TESTS
// ============================================================================

#[test]
fn test_spirv_words_accepts_header() {
    let words = spirv_words(&header_only_module()).unwrap();
    assert_eq!(words.len(), 5);
    assert_eq!(words[0], SPIRV_MAGIC);
}

#[test]
fn test_spirv_words_rejects_short_blob() {
    let err = spirv_words(&[0x03, 0x02, 0x23, 0x07]).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_spirv_words_rejects_unaligned_length() {
    let mut bytes = header_only_module();
    bytes.push(0);
    assert!(spirv_words(&bytes).unwrap_err().is_invalid_argument());
}

#[test]
fn test_spirv_words_rejects_bad_magic() {
    let mut bytes = header_only_module();
    bytes[0] = 0xFF;
    assert!(spirv_words(&bytes).unwrap_err().is_invalid_argument());
}

#[test]
fn test_reflection_without_entry_point_falls_back_to_main() {
    let words = spirv_words(&header_only_module()).unwrap();
    let reflection = reflect_stage(&words, vk::ShaderStageFlags::VERTEX);
    assert_eq!(reflection.entry, "main");
    assert!(reflection.bindings.is_empty());
}

// ============================================================================
// LAYOUT SCHEMA TESTS
// ============================================================================

#[test]
fn test_set_schemas_without_layouts() {
    assert!(set_schemas(None, None).is_empty());
}

#[test]
fn test_set_schemas_second_only_gets_placeholder() {
    let schemas = set_schemas(None, Some(schema(&[0])));
    assert_eq!(schemas.len(), 2);
    assert!(schemas[0].is_none());
    assert!(schemas[1].is_some());
}

#[test]
fn test_undeclared_bindings() {
    let schemas = set_schemas(Some(schema(&[0, 1])), None);
    let used = [(0, 0), (0, 1), (0, 2), (1, 0)];
    assert_eq!(undeclared_bindings(&used, &schemas), vec![(0, 2), (1, 0)]);
}

#[test]
fn test_placeholder_set_declares_nothing() {
    let schemas = set_schemas(None, Some(schema(&[0])));
    assert_eq!(undeclared_bindings(&[(0, 0), (1, 0)], &schemas), vec![(0, 0)]);
}

// ============================================================================
// BLEND STATE TESTS
// ============================================================================

#[test]
fn test_blend_attachments_padded_with_defaults() {
    let state = GraphicsPipelineStateDesc {
        blend_attachments: vec![BlendAttachmentDesc { blend_enable: true, ..Default::default() }],
        ..Default::default()
    };
    let attachments = blend_attachments(&state, 3);
    assert_eq!(attachments.len(), 3);
    assert_eq!(attachments[0].blend_enable, vk::TRUE);
    assert_eq!(attachments[1].blend_enable, vk::FALSE);
    assert_eq!(attachments[2].color_write_mask, vk::ColorComponentFlags::RGBA);
}

#[test]
fn test_blend_attachments_truncated_to_subpass() {
    let state = GraphicsPipelineStateDesc {
        blend_attachments: vec![BlendAttachmentDesc::default(); 4],
        ..Default::default()
    };
    assert_eq!(blend_attachments(&state, 2).len(), 2);
    assert!(blend_attachments(&state, 0).is_empty());
}

#[test]
fn test_blend_factors_applied_when_enabled() {
    let state = GraphicsPipelineStateDesc {
        blend_attachments: vec![BlendAttachmentDesc {
            blend_enable: true,
            src_color_blend: BlendFactor::One,
            dst_color_blend: BlendFactor::One,
            ..Default::default()
        }],
        ..Default::default()
    };
    let attachment = blend_attachments(&state, 1)[0];
    assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::ONE);
    assert_eq!(attachment.dst_color_blend_factor, vk::BlendFactor::ONE);
}

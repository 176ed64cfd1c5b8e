//! Unit tests for render_pass.rs
//!
//! Tests render pass topology validation and begin-time attachment counts.

use crate::device::{
    AttachmentDesc, ColorAttachment, RenderPassBeginDesc, RenderPassDesc, SubpassDesc,
    TextureFormat, TextureHandle,
};

fn color() -> AttachmentDesc {
    AttachmentDesc::new(TextureFormat::R8G8B8A8_UNORM)
}

// ============================================================================
// RENDER PASS DESC
// ============================================================================

#[test]
fn test_single_subpass_covers_all_color_attachments() {
    let desc = RenderPassDesc::single_subpass(vec![color(), color()], None);
    assert_eq!(desc.subpass_count(), 1);
    assert_eq!(desc.subpasses[0].color_attachments, vec![0, 1]);
    assert!(!desc.subpasses[0].depth_stencil);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_single_subpass_with_depth() {
    let desc = RenderPassDesc::single_subpass(
        vec![color()],
        Some(AttachmentDesc::new(TextureFormat::D32_FLOAT)),
    );
    assert!(desc.subpasses[0].depth_stencil);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_two_subpasses() {
    let desc = RenderPassDesc {
        color_attachments: vec![color(), color()],
        depth_stencil_attachment: None,
        subpasses: vec![
            SubpassDesc { color_attachments: vec![0], depth_stencil: false },
            SubpassDesc { color_attachments: vec![1], depth_stencil: false },
        ],
    };
    assert_eq!(desc.subpass_count(), 2);
    assert!(desc.validate().is_ok());
}

#[test]
fn test_no_attachments_is_rejected() {
    let desc = RenderPassDesc { subpasses: vec![SubpassDesc::default()], ..Default::default() };
    assert!(desc.validate().unwrap_err().is_invalid_argument());
}

#[test]
fn test_no_subpass_is_rejected() {
    let desc = RenderPassDesc { color_attachments: vec![color()], ..Default::default() };
    assert!(desc.validate().is_err());
}

#[test]
fn test_nine_color_attachments_are_rejected() {
    let desc = RenderPassDesc::single_subpass(vec![color(); 9], None);
    assert!(desc.validate().is_err());
}

#[test]
fn test_out_of_range_attachment_index_is_rejected() {
    let desc = RenderPassDesc {
        color_attachments: vec![color()],
        depth_stencil_attachment: None,
        subpasses: vec![SubpassDesc { color_attachments: vec![1], depth_stencil: false }],
    };
    assert!(desc.validate().is_err());
}

#[test]
fn test_depth_subpass_without_depth_attachment_is_rejected() {
    let desc = RenderPassDesc {
        color_attachments: vec![color()],
        depth_stencil_attachment: None,
        subpasses: vec![SubpassDesc { color_attachments: vec![0], depth_stencil: true }],
    };
    assert!(desc.validate().is_err());
}

#[test]
fn test_color_format_as_depth_is_rejected() {
    let desc = RenderPassDesc::single_subpass(vec![color()], Some(color()));
    assert!(desc.validate().is_err());
}

// ============================================================================
// BEGIN DESC
// ============================================================================

#[test]
fn test_begin_desc_color_count_bounds() {
    let attachment = ColorAttachment::clear(TextureHandle::default(), [0.0, 0.0, 0.0, 1.0]);

    let empty = RenderPassBeginDesc::default();
    assert!(empty.validate().is_err());

    let one = RenderPassBeginDesc { color_attachments: vec![attachment], depth_stencil_attachment: None };
    assert!(one.validate().is_ok());

    let eight = RenderPassBeginDesc { color_attachments: vec![attachment; 8], depth_stencil_attachment: None };
    assert!(eight.validate().is_ok());

    let nine = RenderPassBeginDesc { color_attachments: vec![attachment; 9], depth_stencil_attachment: None };
    assert!(nine.validate().is_err());
}

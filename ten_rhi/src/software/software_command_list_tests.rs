//! Unit tests for software command recording

use super::{SoftwareCommand, SoftwareCommandList};
use crate::device::{
    AttachmentDesc, BufferDesc, BufferUsage, ColorAttachment, CommandList, ComputePsoDesc, Device,
    GraphicsPsoDesc, RecordingState, RenderPassBeginDesc, RenderPassDesc, ShaderBytecode,
    SubpassDesc, TextureDesc, TextureFormat, TextureHandle, TextureRegion, AccelerationStructureDesc,
    AccelerationStructureType, DispatchRaysDesc, OCCLUSION_QUERY_COUNT, RhiConfig,
};
use crate::software::SoftwareDevice;

fn device() -> SoftwareDevice {
    SoftwareDevice::new(&RhiConfig::default()).unwrap()
}

fn software(list: &dyn CommandList) -> &SoftwareCommandList {
    list.as_any().downcast_ref::<SoftwareCommandList>().unwrap()
}

fn target(device: &SoftwareDevice) -> TextureHandle {
    device
        .create_texture(&TextureDesc::render_target(16, 16, TextureFormat::R8G8B8A8_UNORM))
        .unwrap()
}

fn one_color(texture: TextureHandle) -> RenderPassBeginDesc {
    RenderPassBeginDesc {
        color_attachments: vec![ColorAttachment::clear(texture, [0.0, 0.0, 0.0, 1.0])],
        depth_stencil_attachment: None,
    }
}

fn vertex_shader() -> GraphicsPsoDesc {
    GraphicsPsoDesc {
        vertex_shader: ShaderBytecode::new(vec![1, 2, 3, 4]),
        ..Default::default()
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_recording_outside_begin_is_ignored() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.draw(3, 1, 0, 0);
    list.dispatch(1, 1, 1);

    assert_eq!(list.state(), RecordingState::NotRecording);
    assert_eq!(software(list.as_ref()).command_count(), 0);
}

#[test]
fn test_begin_resets_recorded_commands() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.draw(3, 1, 0, 0);
    list.end();
    assert_eq!(software(list.as_ref()).command_count(), 1);

    list.begin();
    assert_eq!(software(list.as_ref()).command_count(), 0);
    assert_eq!(list.state(), RecordingState::Recording);
}

#[test]
fn test_end_twice_keeps_executable() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.end();
    list.end();

    assert_eq!(list.state(), RecordingState::Executable);
}

// ============================================================================
// RENDER PASSES
// ============================================================================

#[test]
fn test_implicit_render_pass_has_one_subpass() {
    let device = device();
    let texture = target(&device);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), None);
    assert_eq!(list.current_subpass(), Some(0));
    assert!(software(list.as_ref()).has_transient_framebuffer());

    list.next_subpass();
    assert_eq!(list.current_subpass(), Some(0));

    list.end_render_pass();
    assert_eq!(list.current_subpass(), None);
    assert!(!software(list.as_ref()).has_transient_framebuffer());
}

#[test]
fn test_explicit_render_pass_walks_subpasses() {
    let device = device();
    let texture = target(&device);
    let pass = device
        .create_render_pass(&RenderPassDesc {
            color_attachments: vec![AttachmentDesc::new(TextureFormat::R8G8B8A8_UNORM)],
            depth_stencil_attachment: None,
            subpasses: vec![
                SubpassDesc { color_attachments: vec![0], depth_stencil: false },
                SubpassDesc { color_attachments: vec![0], depth_stencil: false },
            ],
        })
        .unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), Some(pass));
    list.next_subpass();
    assert_eq!(list.current_subpass(), Some(1));
    list.next_subpass();
    assert_eq!(list.current_subpass(), Some(1));
    list.end_render_pass();

    let commands = &software(list.as_ref()).commands;
    let subpass_moves = commands.iter().filter(|c| **c == SoftwareCommand::NextSubpass).count();
    assert_eq!(subpass_moves, 1);
}

#[test]
fn test_render_pass_with_mismatched_format_is_skipped() {
    let device = device();
    let texture = target(&device);
    let pass = device
        .create_render_pass(&RenderPassDesc::single_subpass(
            vec![AttachmentDesc::new(TextureFormat::B8G8R8A8_UNORM)],
            None,
        ))
        .unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), Some(pass));

    assert_eq!(list.current_subpass(), None);
    assert_eq!(software(list.as_ref()).command_count(), 0);
}

#[test]
fn test_render_pass_without_color_is_skipped() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&RenderPassBeginDesc::default(), None);

    assert_eq!(list.current_subpass(), None);
}

#[test]
fn test_nested_render_pass_is_skipped() {
    let device = device();
    let texture = target(&device);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), None);
    list.begin_render_pass(&one_color(texture), None);

    assert_eq!(software(list.as_ref()).command_count(), 1);
}

#[test]
fn test_end_closes_open_render_pass() {
    let device = device();
    let texture = target(&device);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), None);
    list.end();

    let list = software(list.as_ref());
    assert!(!list.has_transient_framebuffer());
    assert_eq!(list.commands.last(), Some(&SoftwareCommand::EndRenderPass));
}

#[test]
fn test_render_pass_with_destroyed_texture_is_skipped() {
    let device = device();
    let texture = target(&device);
    device.destroy_texture(texture);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&one_color(texture), None);

    assert_eq!(list.current_subpass(), None);
}

// ============================================================================
// HANDLE CHECKS
// ============================================================================

#[test]
fn test_stale_buffer_commands_are_skipped() {
    let device = device();
    let buffer = device.create_buffer(&BufferDesc::new(64, BufferUsage::VERTEX)).unwrap();
    let other = device.create_buffer(&BufferDesc::new(64, BufferUsage::COPY_DST)).unwrap();
    device.destroy_buffer(buffer);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.set_vertex_buffer(0, buffer, 0, 12);
    list.copy_buffer(buffer, 0, other, 0, 16);
    list.copy_texture_to_buffer(TextureHandle::default(), &TextureRegion::full(1, 1), other, 0);

    assert_eq!(software(list.as_ref()).command_count(), 0);
}

#[test]
fn test_pso_kind_must_match_bind_point() {
    let device = device();
    let graphics = device.create_graphics_pso(&vertex_shader(), None, None, 0, None).unwrap();
    let compute = device
        .create_compute_pso(&ComputePsoDesc { compute_shader: ShaderBytecode::new(vec![7; 8]) }, None)
        .unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.set_compute_pso(graphics);
    list.set_graphics_pso(compute);
    assert_eq!(software(list.as_ref()).command_count(), 0);

    list.set_graphics_pso(graphics);
    list.set_compute_pso(compute);
    assert_eq!(software(list.as_ref()).command_count(), 2);
}

#[test]
fn test_occlusion_query_index_range() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_occlusion_query(OCCLUSION_QUERY_COUNT);
    list.end_occlusion_query(OCCLUSION_QUERY_COUNT);
    assert_eq!(software(list.as_ref()).command_count(), 0);

    list.begin_occlusion_query(OCCLUSION_QUERY_COUNT - 1);
    list.end_occlusion_query(OCCLUSION_QUERY_COUNT - 1);
    assert_eq!(software(list.as_ref()).command_count(), 2);
}

#[test]
fn test_nested_occlusion_query_is_skipped() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_occlusion_query(1);
    list.begin_occlusion_query(2);
    list.end_occlusion_query(2);
    assert_eq!(software(list.as_ref()).command_count(), 1);

    list.end_occlusion_query(1);
    assert_eq!(software(list.as_ref()).command_count(), 2);
}

#[test]
fn test_end_closes_active_occlusion_query() {
    let device = device();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_occlusion_query(7);
    list.end();
    assert_eq!(software(list.as_ref()).command_count(), 2);
    assert_eq!(list.state(), RecordingState::Executable);
}

#[test]
fn test_ray_tracing_is_a_noop() {
    let device = device();
    let scratch = device.create_buffer(&BufferDesc::new(256, BufferUsage::STORAGE)).unwrap();
    let result = device.create_buffer(&BufferDesc::new(256, BufferUsage::STORAGE)).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.build_acceleration_structure(
        &AccelerationStructureDesc {
            ty: AccelerationStructureType::TopLevel,
            geometries: Vec::new(),
            instance_count: 1,
        },
        scratch,
        result,
    );
    list.dispatch_rays(&DispatchRaysDesc { width: 8, height: 8, depth: 1 });

    assert!(!device.features().ray_tracing);
    assert_eq!(software(list.as_ref()).command_count(), 0);
}

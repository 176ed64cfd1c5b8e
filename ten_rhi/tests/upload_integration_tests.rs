//! Integration tests for create + upload workflows
//!
//! Exercises the paths a resource manager takes: direct host writes, staged
//! uploads into device-local memory, texture uploads and render target
//! readback.
//!
//! Run with: cargo test --test upload_integration_tests


use ten_rhi::rhi::device::{
    BufferBarrier, BufferDesc, BufferUsage, ColorAttachment, DepthStencilAttachment, Device,
    GraphicsPsoDesc, LoadOp, QueueType, RenderPassBeginDesc, ResourceState, ShaderBytecode,
    StoreOp, TextureBarrier, TextureDesc, TextureFormat, TextureRegion,
};
use ten_rhi::rhi::Error;
use ten_rhi::rhi::software::SoftwareDevice;
use test_utils::{pattern, readback_buffer, software_device, staging_buffer};

// ============================================================================
// UNIFORM BUFFER
// ============================================================================

#[test]
fn test_integration_uniform_buffer_visible_after_fence() {
    let device = SoftwareDevice::new(&Default::default()).unwrap();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let data = pattern(256);
    let buffer = device.create_buffer(&BufferDesc::new(256, BufferUsage::UNIFORM)).unwrap();
    device.update_buffer(buffer, 0, &data).unwrap();
    let target = device
        .create_texture(&TextureDesc::render_target(4, 4, TextureFormat::R8G8B8A8_UNORM))
        .unwrap();
    let pso = device
        .create_graphics_pso(
            &GraphicsPsoDesc { vertex_shader: ShaderBytecode::new(vec![1; 4]), ..Default::default() },
            None,
            None,
            0,
            None,
        )
        .unwrap();
    let fence = device.create_fence(false).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.set_uniform_buffer(0, buffer, 0);
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment::clear(target, [0.0; 4])],
            depth_stencil_attachment: None,
        },
        None,
    );
    list.set_graphics_pso(pso);
    list.draw(3, 1, 0, 0);
    list.end();
    queue.submit(list.as_mut(), Some(fence), None, None);
    device.wait_fence(fence).unwrap();

    let draw = device.queue_stats(QueueType::Graphics).last_draw.unwrap();
    assert_eq!(draw.bindings.len(), 1);
    assert_eq!(draw.bindings[0].binding, 0);
    assert_eq!(device.read_buffer(buffer, 0, 256).unwrap(), data);
}

// ============================================================================
// STAGED UPLOADS
// ============================================================================

#[test]
fn test_integration_device_local_buffer_needs_staging() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let data = pattern(1024);
    let vertices = device
        .create_buffer(&BufferDesc::new(1024, BufferUsage::VERTEX | BufferUsage::COPY_DST | BufferUsage::COPY_SRC))
        .unwrap();
    assert!(matches!(device.update_buffer(vertices, 0, &data), Err(Error::InvalidResource(_))));

    let staging = staging_buffer(device.as_ref(), &data);
    let readback = readback_buffer(device.as_ref(), 1024);
    let fence = device.create_fence(false).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.copy_buffer(staging, 0, vertices, 0, 1024);
    list.resource_barrier(
        &[BufferBarrier::whole(vertices, ResourceState::CopyDst, ResourceState::CopySrc)],
        &[],
    );
    list.copy_buffer(vertices, 0, readback, 0, 1024);
    list.end();
    queue.submit(list.as_mut(), Some(fence), None, None);
    device.wait_fence(fence).unwrap();

    assert_eq!(device.read_buffer(readback, 0, 1024).unwrap(), data);
}

#[test]
fn test_integration_texture_upload_and_readback() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let mut desc = TextureDesc::new_2d(8, 8, TextureFormat::R8G8B8A8_UNORM);
    desc.mip_levels = 2;
    desc.usage |= ten_rhi::rhi::device::TextureUsage::COPY_SRC;
    let texture = device.create_texture(&desc).unwrap();
    let mip0 = pattern(8 * 8 * 4);
    let mip1 = pattern(4 * 4 * 4).into_iter().rev().collect::<Vec<u8>>();
    let staging = staging_buffer(device.as_ref(), &[mip0.clone(), mip1.clone()].concat());
    let readback = readback_buffer(device.as_ref(), 4 * 4 * 4);
    let mip1_region = TextureRegion { mip_level: 1, ..TextureRegion::full(4, 4) };

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.copy_buffer_to_texture(staging, 0, texture, &TextureRegion::full(8, 8));
    list.copy_buffer_to_texture(staging, mip0.len() as u64, texture, &mip1_region);
    list.resource_barrier(
        &[],
        &[TextureBarrier::new(texture, ResourceState::CopyDst, ResourceState::CopySrc)],
    );
    list.copy_texture_to_buffer(texture, &mip1_region, readback, 0);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.read_buffer(readback, 0, mip1.len() as u64).unwrap(), mip1);
}

// ============================================================================
// RENDER TARGETS
// ============================================================================

#[test]
fn test_integration_clear_and_readback_render_target() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let color = device
        .create_texture(&TextureDesc::render_target(2, 2, TextureFormat::R8G8B8A8_UNORM))
        .unwrap();
    let mut depth_desc = TextureDesc::render_target(2, 2, TextureFormat::D32_FLOAT);
    depth_desc.usage |= ten_rhi::rhi::device::TextureUsage::COPY_SRC;
    let depth = device.create_texture(&depth_desc).unwrap();
    let color_readback = readback_buffer(device.as_ref(), 16);
    let depth_readback = readback_buffer(device.as_ref(), 16);

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment::clear(color, [1.0, 0.0, 0.0, 1.0])],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                texture: depth,
                load_op: LoadOp::Clear,
                store_op: StoreOp::Store,
                clear_depth: 1.0,
                clear_stencil: 0,
            }),
        },
        None,
    );
    list.end_render_pass();
    list.copy_texture_to_buffer(color, &TextureRegion::full(2, 2), color_readback, 0);
    list.copy_texture_to_buffer(depth, &TextureRegion::full(2, 2), depth_readback, 0);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.read_buffer(color_readback, 0, 16).unwrap(), [255, 0, 0, 255].repeat(4));
    assert_eq!(device.read_buffer(depth_readback, 0, 16).unwrap(), 1.0f32.to_le_bytes().repeat(4));
}

#[test]
fn test_integration_load_op_keeps_contents() {
    let device = software_device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let color = device
        .create_texture(&TextureDesc::render_target(1, 1, TextureFormat::R8G8B8A8_UNORM))
        .unwrap();
    let readback = readback_buffer(device.as_ref(), 4);

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment::clear(color, [0.0, 1.0, 0.0, 1.0])],
            depth_stencil_attachment: None,
        },
        None,
    );
    list.end_render_pass();
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment { load_op: LoadOp::Load, ..ColorAttachment::clear(color, [1.0; 4]) }],
            depth_stencil_attachment: None,
        },
        None,
    );
    list.end_render_pass();
    list.copy_texture_to_buffer(color, &TextureRegion::full(1, 1), readback, 0);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.read_buffer(readback, 0, 4).unwrap(), vec![0, 255, 0, 255]);
}

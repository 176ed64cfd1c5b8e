//! Integration tests for pipelines, descriptor sets and render pass objects
//!
//! Run with: cargo test --test pipeline_integration_tests


use ten_rhi::rhi::device::{
    AttachmentDesc, BufferDesc, BufferUsage, ColorAttachment, ComputePsoDesc, DescriptorResource,
    DescriptorSetLayoutBinding, DescriptorSetLayoutDesc, DescriptorType, DescriptorWrite, Device,
    GraphicsPsoDesc, QueueType, RenderPassBeginDesc, RenderPassDesc, SamplerDesc, ShaderBytecode,
    SubpassDesc, TextureDesc, TextureFormat, TextureHandle,
};
use ten_rhi::rhi::software::{ResolvedBinding, SoftwareDevice};

fn device() -> SoftwareDevice {
    SoftwareDevice::new(&Default::default()).unwrap()
}

fn shaders() -> GraphicsPsoDesc {
    GraphicsPsoDesc {
        vertex_shader: ShaderBytecode::new(vec![0x11; 16]),
        fragment_shader: ShaderBytecode::new(vec![0x22; 16]),
        ..Default::default()
    }
}

fn color_target(device: &SoftwareDevice) -> TextureHandle {
    device
        .create_texture(&TextureDesc::render_target(8, 8, TextureFormat::R8G8B8A8_UNORM))
        .unwrap()
}

// ============================================================================
// DESCRIPTOR SETS
// ============================================================================

#[test]
fn test_integration_descriptor_set_resolves_at_draw() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let buffer = device.create_buffer(&BufferDesc::new(256, BufferUsage::UNIFORM)).unwrap();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc::new(vec![DescriptorSetLayoutBinding::new(
            0,
            DescriptorType::UniformBuffer,
        )]))
        .unwrap();
    let set = device.allocate_descriptor_set(layout).unwrap();
    device.update_descriptor_set(set, &[DescriptorWrite::buffer(0, buffer)]);
    let pso = device.create_graphics_pso(&shaders(), Some(layout), None, 0, None).unwrap();
    let target = color_target(&device);

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment::clear(target, [0.0; 4])],
            depth_stencil_attachment: None,
        },
        None,
    );
    list.set_graphics_pso(pso);
    list.bind_descriptor_set(0, set);
    list.draw(3, 1, 0, 0);
    list.end_render_pass();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let draw = device.queue_stats(QueueType::Graphics).last_draw.unwrap();
    assert_eq!(
        draw.bindings,
        vec![ResolvedBinding {
            set_index: 0,
            binding: 0,
            resource: DescriptorResource::Buffer { buffer, offset: 0, range: 0 },
        }]
    );
}

#[test]
fn test_integration_two_descriptor_sets() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let frame_layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc::new(vec![DescriptorSetLayoutBinding::new(
            0,
            DescriptorType::UniformBuffer,
        )]))
        .unwrap();
    let material_layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc::new(vec![
            DescriptorSetLayoutBinding::new(0, DescriptorType::ShaderResource),
            DescriptorSetLayoutBinding::new(1, DescriptorType::Sampler),
        ]))
        .unwrap();
    let frame = device.allocate_descriptor_set(frame_layout).unwrap();
    let material = device.allocate_descriptor_set(material_layout).unwrap();
    let uniforms = device.create_buffer(&BufferDesc::new(256, BufferUsage::UNIFORM)).unwrap();
    let albedo = device.create_texture(&TextureDesc::new_2d(4, 4, TextureFormat::R8G8B8A8_SRGB)).unwrap();
    let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
    device.update_descriptor_set(frame, &[DescriptorWrite::buffer(0, uniforms)]);
    device.update_descriptor_set(
        material,
        &[DescriptorWrite::texture(0, albedo), DescriptorWrite::sampler(1, sampler)],
    );
    let pso = device
        .create_graphics_pso(&shaders(), Some(frame_layout), None, 0, Some(material_layout))
        .unwrap();
    let target = color_target(&device);

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(
        &RenderPassBeginDesc {
            color_attachments: vec![ColorAttachment::clear(target, [0.0; 4])],
            depth_stencil_attachment: None,
        },
        None,
    );
    list.set_graphics_pso(pso);
    list.bind_descriptor_set(0, frame);
    list.bind_descriptor_set(1, material);
    list.draw(6, 1, 0, 0);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let bindings = device.queue_stats(QueueType::Graphics).last_draw.unwrap().bindings;
    assert_eq!(bindings.len(), 3);
    assert_eq!(bindings[1].resource, DescriptorResource::Texture(albedo));
    assert_eq!(bindings[2].resource, DescriptorResource::Sampler(sampler));
    assert_eq!(bindings[2].set_index, 1);
}

// ============================================================================
// SUBPASSES
// ============================================================================

#[test]
fn test_integration_two_subpass_render_pass() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let pass = device
        .create_render_pass(&RenderPassDesc {
            color_attachments: vec![
                AttachmentDesc::new(TextureFormat::R8G8B8A8_UNORM),
                AttachmentDesc::new(TextureFormat::R8G8B8A8_UNORM),
            ],
            depth_stencil_attachment: None,
            subpasses: vec![
                SubpassDesc { color_attachments: vec![0], depth_stencil: false },
                SubpassDesc { color_attachments: vec![1], depth_stencil: false },
            ],
        })
        .unwrap();
    let gbuffer_pso = device.create_graphics_pso(&shaders(), None, Some(pass), 0, None).unwrap();
    let lighting_pso = device.create_graphics_pso(&shaders(), None, Some(pass), 1, None).unwrap();
    let begin = RenderPassBeginDesc {
        color_attachments: vec![
            ColorAttachment::clear(color_target(&device), [0.0; 4]),
            ColorAttachment::clear(color_target(&device), [0.0; 4]),
        ],
        depth_stencil_attachment: None,
    };

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(&begin, Some(pass));
    assert_eq!(list.current_subpass(), Some(0));
    list.set_graphics_pso(gbuffer_pso);
    list.draw(3, 1, 0, 0);

    list.next_subpass();
    assert_eq!(list.current_subpass(), Some(1));
    list.next_subpass();
    assert_eq!(list.current_subpass(), Some(1));

    list.set_graphics_pso(lighting_pso);
    list.draw(3, 1, 0, 0);
    // built for subpass 0, rejected in subpass 1
    list.set_graphics_pso(gbuffer_pso);
    list.draw(3, 1, 0, 0);
    list.end_render_pass();
    assert_eq!(list.current_subpass(), None);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.draws, 2);
    assert_eq!(stats.skipped_commands, 1);
}

// ============================================================================
// COMPUTE
// ============================================================================

#[test]
fn test_integration_compute_dispatch() {
    let device = device();
    let queue = device.get_queue(QueueType::Compute, 0).unwrap();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc::new(vec![DescriptorSetLayoutBinding::new(
            0,
            DescriptorType::UnorderedAccess,
        )]))
        .unwrap();
    let storage = device.create_buffer(&BufferDesc::new(1024, BufferUsage::STORAGE)).unwrap();
    let set = device.allocate_descriptor_set(layout).unwrap();
    device.update_descriptor_set(set, &[DescriptorWrite::buffer(0, storage)]);
    let pso = device
        .create_compute_pso(&ComputePsoDesc { compute_shader: ShaderBytecode::new(vec![0x33; 16]) }, Some(layout))
        .unwrap();
    let fence = device.create_fence(false).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.dispatch(1, 1, 1);
    list.set_compute_pso(pso);
    list.bind_descriptor_set(0, set);
    list.dispatch(8, 8, 1);
    list.dispatch(0, 1, 1);
    list.end();
    queue.submit(list.as_mut(), Some(fence), None, None);
    device.wait_fence(fence).unwrap();

    let stats = device.queue_stats(QueueType::Compute);
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.skipped_commands, 2);
}

#[test]
fn test_integration_destroyed_pso_is_not_bound() {
    let device = device();
    let pso = device.create_graphics_pso(&shaders(), None, None, 0, None).unwrap();
    device.destroy_pso(pso);
    device.destroy_pso(pso);
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.set_graphics_pso(pso);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.queue_stats(QueueType::Graphics).submissions, 1);
}

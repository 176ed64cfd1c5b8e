//! Unit tests for software queue execution

use crate::device::{
    BufferBarrier, BufferDesc, BufferUsage, ColorAttachment, CommandList, DescriptorResource,
    DescriptorSetLayoutBinding, DescriptorSetLayoutDesc, DescriptorType, DescriptorWrite, Device,
    GraphicsPsoDesc, IndexFormat, QueueType, RecordingState, RenderPassBeginDesc, ResourceState,
    RhiConfig, ShaderBytecode, TextureDesc, TextureFormat, Viewport,
};
use crate::software::{ResolvedBinding, SoftwareDevice};

fn device() -> SoftwareDevice {
    SoftwareDevice::new(&RhiConfig::default()).unwrap()
}

fn staging(device: &SoftwareDevice, bytes: &[u8]) -> crate::device::BufferHandle {
    let buffer = device.create_buffer(&BufferDesc::staging(bytes.len() as u64)).unwrap();
    device.update_buffer(buffer, 0, bytes).unwrap();
    buffer
}

fn readback(device: &SoftwareDevice, size: u64) -> crate::device::BufferHandle {
    let mut desc = BufferDesc::new(size, BufferUsage::COPY_DST);
    desc.location = Some(crate::device::MemoryLocation::HostVisible);
    device.create_buffer(&desc).unwrap()
}

fn graphics_pso(device: &SoftwareDevice, layout: Option<crate::device::DescriptorSetLayoutHandle>) -> crate::device::PsoHandle {
    let desc = GraphicsPsoDesc {
        vertex_shader: ShaderBytecode::new(vec![1; 4]),
        fragment_shader: ShaderBytecode::new(vec![2; 4]),
        ..Default::default()
    };
    device.create_graphics_pso(&desc, layout, None, 0, None).unwrap()
}

fn render_pass(device: &SoftwareDevice) -> RenderPassBeginDesc {
    let texture = device
        .create_texture(&TextureDesc::render_target(4, 4, TextureFormat::R8G8B8A8_UNORM))
        .unwrap();
    RenderPassBeginDesc {
        color_attachments: vec![ColorAttachment::clear(texture, [0.0, 0.0, 0.0, 1.0])],
        depth_stencil_attachment: None,
    }
}

// ============================================================================
// SUBMISSION RULES
// ============================================================================

#[test]
fn test_submit_signals_fence_and_counts() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let fence = device.create_fence(false).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.end();
    queue.submit(list.as_mut(), Some(fence), None, None);
    device.wait_fence(fence).unwrap();

    assert_eq!(list.state(), RecordingState::Submitted);
    assert_eq!(device.queue_stats(QueueType::Graphics).submissions, 1);
}

#[test]
fn test_submit_recording_list_is_ignored() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(list.state(), RecordingState::Recording);
    assert_eq!(device.queue_stats(QueueType::Graphics).submissions, 0);
}

#[test]
fn test_double_submit_is_ignored() {
    let device = device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.queue_stats(QueueType::Copy).submissions, 1);
}

#[test]
fn test_list_from_other_device_is_ignored() {
    let first = device();
    let second = device();
    let queue = first.get_queue(QueueType::Graphics, 0).unwrap();
    let mut list = second.create_command_list().unwrap();

    list.begin();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(list.state(), RecordingState::Executable);
    assert_eq!(first.queue_stats(QueueType::Graphics).submissions, 0);
}

// ============================================================================
// EXECUTION
// ============================================================================

#[test]
fn test_fifo_copies_apply_in_order() {
    let device = device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let ones = staging(&device, &[1; 8]);
    let twos = staging(&device, &[2; 8]);
    let dst = readback(&device, 8);

    let mut first = device.create_command_list().unwrap();
    first.begin();
    first.copy_buffer(ones, 0, dst, 0, 8);
    first.end();
    let mut second = device.create_command_list().unwrap();
    second.begin();
    second.copy_buffer(twos, 0, dst, 4, 4);
    second.end();

    queue.submit(first.as_mut(), None, None, None);
    queue.submit(second.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    assert_eq!(device.read_buffer(dst, 0, 8).unwrap(), vec![1, 1, 1, 1, 2, 2, 2, 2]);
    assert_eq!(device.queue_stats(QueueType::Copy).copies, 2);
}

#[test]
fn test_out_of_range_copy_is_skipped_at_execution() {
    let device = device();
    let queue = device.get_queue(QueueType::Copy, 0).unwrap();
    let src = staging(&device, &[5; 4]);
    let dst = readback(&device, 4);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.copy_buffer(src, 0, dst, 2, 4);
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Copy);
    assert_eq!(stats.copies, 0);
    assert_eq!(stats.skipped_commands, 1);
    assert_eq!(device.read_buffer(dst, 0, 4).unwrap(), vec![0; 4]);
}

#[test]
fn test_draw_records_bound_state() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc::new(vec![DescriptorSetLayoutBinding::new(
            1,
            DescriptorType::UniformBuffer,
        )]))
        .unwrap();
    let pso = graphics_pso(&device, Some(layout));
    let uniforms = device.create_buffer(&BufferDesc::new(256, BufferUsage::UNIFORM)).unwrap();
    let vertices = device.create_buffer(&BufferDesc::new(256, BufferUsage::VERTEX)).unwrap();
    let indices = device.create_buffer(&BufferDesc::new(64, BufferUsage::INDEX)).unwrap();
    let set = device.allocate_descriptor_set(layout).unwrap();
    device.update_descriptor_set(set, &[DescriptorWrite::buffer(1, uniforms)]);
    let pass = render_pass(&device);

    let mut list = device.create_command_list().unwrap();
    list.begin();
    list.begin_render_pass(&pass, None);
    list.set_graphics_pso(pso);
    list.bind_descriptor_set(0, set);
    list.set_viewport(0, &[Viewport::from_extent(4, 4)]);
    list.set_vertex_buffer(0, vertices, 16, 12);
    list.set_index_buffer(indices, 0, IndexFormat::U16);
    list.draw_indexed(6, 2, 0, 0, 0);
    list.end_render_pass();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.render_passes, 1);
    let draw = stats.last_draw.unwrap();
    assert_eq!(draw.pso, pso);
    assert_eq!(draw.vertex_count, 6);
    assert_eq!(draw.instance_count, 2);
    assert_eq!(draw.vertex_offset, Some(0));
    assert_eq!(draw.viewport, Some(Viewport::from_extent(4, 4)));
    assert_eq!(draw.vertex_buffers.len(), 1);
    assert_eq!(draw.vertex_buffers[0].offset, 16);
    assert_eq!(draw.index_buffer, Some((indices, 0, IndexFormat::U16)));
    assert_eq!(
        draw.bindings,
        vec![ResolvedBinding {
            set_index: 0,
            binding: 1,
            resource: DescriptorResource::Buffer { buffer: uniforms, offset: 0, range: 0 },
        }]
    );
}

#[test]
fn test_draw_without_pipeline_or_pass_is_skipped() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let pso = graphics_pso(&device, None);
    let pass = render_pass(&device);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.set_graphics_pso(pso);
    list.draw(3, 1, 0, 0);
    list.begin_render_pass(&pass, None);
    list.draw_indexed(3, 1, 0, 0, 0);
    list.end_render_pass();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.draws, 0);
    assert_eq!(stats.skipped_commands, 2);
}

#[test]
fn test_occlusion_query_counts_samples() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let pso = graphics_pso(&device, None);
    let pass = render_pass(&device);
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.begin_render_pass(&pass, None);
    list.set_graphics_pso(pso);
    list.begin_occlusion_query(3);
    list.draw(3, 2, 0, 0);
    list.draw(6, 1, 0, 0);
    list.end_occlusion_query(3);
    list.end_render_pass();
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.occlusion_result(3), Some(12));
    assert_eq!(stats.occlusion_result(4), None);
}

#[test]
fn test_barriers_are_counted() {
    let device = device();
    let queue = device.get_queue(QueueType::Graphics, 0).unwrap();
    let buffer = device.create_buffer(&BufferDesc::new(64, BufferUsage::VERTEX | BufferUsage::COPY_DST)).unwrap();
    let mut list = device.create_command_list().unwrap();

    list.begin();
    list.resource_barrier(
        &[BufferBarrier::whole(buffer, ResourceState::CopyDst, ResourceState::VertexBuffer)],
        &[],
    );
    list.end();
    queue.submit(list.as_mut(), None, None, None);
    queue.wait_idle().unwrap();

    let stats = device.queue_stats(QueueType::Graphics);
    assert_eq!(stats.barriers, 1);
    assert_eq!(stats.transitions, 1);
}

#[test]
fn test_semaphore_orders_queues() {
    let device = device();
    let copy = device.get_queue(QueueType::Copy, 0).unwrap();
    let graphics = device.get_queue(QueueType::Graphics, 0).unwrap();
    let semaphore = device.create_semaphore().unwrap();
    let src = staging(&device, &[9; 4]);
    let mid = readback(&device, 4);
    let dst = readback(&device, 4);

    // Consumer is submitted first and must wait for the producer
    let mut consumer = device.create_command_list().unwrap();
    consumer.begin();
    consumer.copy_buffer(mid, 0, dst, 0, 4);
    consumer.end();
    graphics.submit(consumer.as_mut(), None, Some(semaphore), None);

    let mut producer = device.create_command_list().unwrap();
    producer.begin();
    producer.copy_buffer(src, 0, mid, 0, 4);
    producer.end();
    copy.submit(producer.as_mut(), None, None, Some(semaphore));

    device.wait_idle().unwrap();
    assert_eq!(device.read_buffer(dst, 0, 4).unwrap(), vec![9; 4]);
}

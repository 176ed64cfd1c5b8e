//! Unit tests for descriptor layouts and write resolution (no GPU required)
//!
//! Records are inserted with null native handles: resolution only reads the
//! object tables.

use super::*;
use ten_rhi::rhi::device::{
    BufferDesc, BufferUsage, DeviceId, SamplerDesc, ShaderStageFlags, TextureDesc, TextureFormat,
};
use crate::vulkan_resources::{VulkanBuffer, VulkanSampler, VulkanTexture};

fn resources_with_objects() -> (
    VulkanResources,
    ten_rhi::rhi::device::BufferHandle,
    ten_rhi::rhi::device::TextureHandle,
    ten_rhi::rhi::device::SamplerHandle,
) {
    let mut resources = VulkanResources::new(DeviceId::next());
    let buffer = resources.buffers.insert(VulkanBuffer {
        buffer: vk::Buffer::null(),
        allocation: None,
        desc: BufferDesc::new(256, BufferUsage::UNIFORM),
    });
    let texture = resources.textures.insert(VulkanTexture {
        image: vk::Image::null(),
        view: vk::ImageView::null(),
        attachment_view: vk::ImageView::null(),
        allocation: None,
        desc: TextureDesc::new_2d(4, 4, TextureFormat::R8G8B8A8_UNORM),
        swap_chain_image: false,
    });
    let sampler = resources.samplers.insert(VulkanSampler {
        sampler: vk::Sampler::null(),
        desc: SamplerDesc::default(),
    });
    (resources, buffer, texture, sampler)
}

// ============================================================================
// POOL AND LAYOUT TESTS
// ============================================================================

#[test]
fn test_pool_sizes_cover_every_descriptor_type() {
    let sizes = pool_sizes();
    for ty in [
        DescriptorType::Sampler,
        DescriptorType::UniformBuffer,
        DescriptorType::ShaderResource,
        DescriptorType::UnorderedAccess,
    ] {
        let native = descriptor_type_to_vk(ty);
        assert!(sizes.iter().any(|s| s.ty == native && s.descriptor_count > 0), "{:?} has no pool capacity", ty);
    }
}

#[test]
fn test_layout_binding_mapping() {
    let binding = DescriptorSetLayoutBinding {
        binding: 3,
        ty: DescriptorType::UniformBuffer,
        count: 2,
        stages: ShaderStageFlags::VERTEX,
    };
    let native = layout_binding(&binding);
    assert_eq!(native.binding, 3);
    assert_eq!(native.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(native.descriptor_count, 2);
    assert_eq!(native.stage_flags, vk::ShaderStageFlags::VERTEX);
}

#[test]
fn test_layout_binding_empty_stages_means_all() {
    let binding = DescriptorSetLayoutBinding {
        binding: 0,
        ty: DescriptorType::Sampler,
        count: 1,
        stages: ShaderStageFlags::empty(),
    };
    let native = layout_binding(&binding);
    assert_eq!(
        native.stage_flags,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::COMPUTE
    );
}

#[test]
fn test_buffer_write_zero_range_is_whole_size() {
    match buffer_write(0, DescriptorType::UniformBuffer, vk::Buffer::null(), 64, 0) {
        NativeWrite::Buffer { info, ty, .. } => {
            assert_eq!(info.offset, 64);
            assert_eq!(info.range, vk::WHOLE_SIZE);
            assert_eq!(ty, vk::DescriptorType::UNIFORM_BUFFER);
        }
        other => panic!("unexpected write {:?}", other),
    }
}

#[test]
fn test_buffer_write_explicit_range() {
    match buffer_write(1, DescriptorType::UnorderedAccess, vk::Buffer::null(), 0, 128) {
        NativeWrite::Buffer { info, ty, binding } => {
            assert_eq!(binding, 1);
            assert_eq!(info.range, 128);
            assert_eq!(ty, vk::DescriptorType::STORAGE_BUFFER);
        }
        other => panic!("unexpected write {:?}", other),
    }
}

// ============================================================================
// WRITE RESOLUTION TESTS
// ============================================================================

#[test]
fn test_resolve_uniform_buffer() {
    let (resources, buffer, _, _) = resources_with_objects();
    let binding = DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBuffer);
    let write = resolve_write(&resources, &binding, DescriptorResource::Buffer { buffer, offset: 0, range: 0 });
    assert!(matches!(write, Ok(NativeWrite::Buffer { binding: 0, .. })));
}

#[test]
fn test_resolve_texture_uses_shader_read_layout() {
    let (resources, _, texture, _) = resources_with_objects();
    let binding = DescriptorSetLayoutBinding::new(1, DescriptorType::ShaderResource);
    match resolve_write(&resources, &binding, DescriptorResource::Texture(texture)) {
        Ok(NativeWrite::Image { ty, info, .. }) => {
            assert_eq!(ty, vk::DescriptorType::SAMPLED_IMAGE);
            assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }
        other => panic!("unexpected resolution {:?}", other),
    }
}

#[test]
fn test_resolve_sampler() {
    let (resources, _, _, sampler) = resources_with_objects();
    let binding = DescriptorSetLayoutBinding::new(2, DescriptorType::Sampler);
    match resolve_write(&resources, &binding, DescriptorResource::Sampler(sampler)) {
        Ok(NativeWrite::Image { ty, .. }) => assert_eq!(ty, vk::DescriptorType::SAMPLER),
        other => panic!("unexpected resolution {:?}", other),
    }
}

#[test]
fn test_resolve_kind_mismatch_is_ignored() {
    let (resources, _, texture, _) = resources_with_objects();
    let binding = DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBuffer);
    assert!(resolve_write(&resources, &binding, DescriptorResource::Texture(texture)).is_err());
}

#[test]
fn test_resolve_storage_texture_is_ignored() {
    let (resources, _, texture, _) = resources_with_objects();
    let binding = DescriptorSetLayoutBinding::new(0, DescriptorType::UnorderedAccess);
    assert_eq!(
        resolve_write(&resources, &binding, DescriptorResource::Texture(texture)).unwrap_err(),
        "storage textures are not supported"
    );
}

#[test]
fn test_resolve_stale_buffer_is_ignored() {
    let (mut resources, buffer, _, _) = resources_with_objects();
    resources.buffers.remove(buffer);
    let binding = DescriptorSetLayoutBinding::new(0, DescriptorType::UniformBuffer);
    assert_eq!(
        resolve_write(&resources, &binding, DescriptorResource::Buffer { buffer, offset: 0, range: 0 }).unwrap_err(),
        "stale buffer"
    );
}

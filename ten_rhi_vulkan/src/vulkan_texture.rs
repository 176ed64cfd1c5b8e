/// Textures and samplers
///
/// Textures are created in `GENERAL` layout, which is what the `Common`
/// resource state stands for. Every later layout change comes from an explicit
/// barrier recorded by the caller.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use ten_rhi::rhi::device::{Filter, SamplerDesc, TextureDesc, TextureRegion, TextureUsage};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::rhi_error;

use crate::vulkan_context::{lock, vk_err, GpuContext, SOURCE};
use crate::vulkan_format::{
    address_mode_to_vk, aspect_mask, filter_to_vk, texture_format_to_vk, texture_usage_to_vk,
};
use crate::vulkan_resources::{VulkanSampler, VulkanTexture};

pub(crate) fn view_type(desc: &TextureDesc) -> vk::ImageViewType {
    if desc.is_3d() {
        vk::ImageViewType::TYPE_3D
    } else if desc.array_layers > 1 {
        vk::ImageViewType::TYPE_2D_ARRAY
    } else {
        vk::ImageViewType::TYPE_2D
    }
}

/// Attachments need a single-subresource view; other textures reuse the full view
pub(crate) fn needs_attachment_view(desc: &TextureDesc) -> bool {
    desc.usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::DEPTH_STENCIL)
        && (desc.mip_levels > 1 || desc.array_layers > 1)
}

/// Whole-texture subresource range
pub(crate) fn full_range(desc: &TextureDesc) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask(desc.format))
        .base_mip_level(0)
        .level_count(desc.mip_levels)
        .base_array_layer(0)
        .layer_count(desc.array_layers)
}

/// Buffer/image copy of a tightly packed region
pub(crate) fn buffer_image_copy(desc: &TextureDesc, buffer_offset: u64, region: &TextureRegion) -> vk::BufferImageCopy {
    // Depth/stencil copies address one aspect at a time
    let aspect = if desc.format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };
    vk::BufferImageCopy::default()
        .buffer_offset(buffer_offset)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(aspect)
                .mip_level(region.mip_level)
                .base_array_layer(region.array_layer)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D { x: region.x as i32, y: region.y as i32, z: region.z as i32 })
        .image_extent(vk::Extent3D { width: region.width, height: region.height, depth: region.depth })
}

/// Check a copy region against the texture's mip chain
pub(crate) fn validate_region(desc: &TextureDesc, region: &TextureRegion) -> Result<()> {
    if region.mip_level >= desc.mip_levels || region.array_layer >= desc.array_layers {
        return Err(Error::InvalidArgument(format!(
            "subresource mip {} layer {} out of range",
            region.mip_level, region.array_layer
        )));
    }
    let extent = |full: u32| (full >> region.mip_level).max(1);
    let fits = |start: u32, len: u32, max: u32| len > 0 && start.checked_add(len).is_some_and(|end| end <= max);
    if !fits(region.x, region.width, extent(desc.width))
        || !fits(region.y, region.height, extent(desc.height))
        || !fits(region.z, region.depth, extent(desc.depth))
    {
        return Err(Error::InvalidArgument(format!(
            "region {}x{}x{} at ({}, {}, {}) exceeds mip {}",
            region.width, region.height, region.depth, region.x, region.y, region.z, region.mip_level
        )));
    }
    Ok(())
}

unsafe fn create_view(
    ctx: &GpuContext,
    image: vk::Image,
    desc: &TextureDesc,
    view_type: vk::ImageViewType,
    range: vk::ImageSubresourceRange,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(texture_format_to_vk(desc.format))
        .subresource_range(range);
    unsafe { ctx.device.create_image_view(&view_info, None) }
        .map_err(|e| vk_err("Failed to create image view", e))
}

pub(crate) fn create(ctx: &GpuContext, desc: &TextureDesc) -> Result<VulkanTexture> {
    unsafe {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(if desc.is_3d() { vk::ImageType::TYPE_3D } else { vk::ImageType::TYPE_2D })
            .format(texture_format_to_vk(desc.format))
            .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: desc.depth })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(texture_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = ctx
            .device
            .create_image(&image_info, None)
            .map_err(|e| vk_err(&format!("Failed to create {}x{} image", desc.width, desc.height), e))?;

        let requirements = ctx.device.get_image_memory_requirements(image);
        let allocation = lock(&ctx.allocator).allocate(&AllocationCreateDesc {
            name: "ten_rhi texture",
            requirements,
            location: gpu_allocator::MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(_) => {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                rhi_error!(SOURCE, "Out of GPU memory for texture (required: {:.2} MB)", size_mb);
                ctx.device.destroy_image(image, None);
                return Err(Error::OutOfMemory);
            }
        };

        let mut record = VulkanTexture {
            image,
            view: vk::ImageView::null(),
            attachment_view: vk::ImageView::null(),
            allocation: Some(allocation),
            desc: desc.clone(),
            swap_chain_image: false,
        };

        let bound = match &record.allocation {
            Some(allocation) => ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()),
            None => Ok(()),
        };
        if let Err(e) = bound {
            destroy(ctx, record);
            return Err(vk_err("Failed to bind image memory", e));
        }

        if let Err(e) = init_views(ctx, &mut record) {
            destroy(ctx, record);
            return Err(e);
        }

        let range = full_range(desc);
        let transitioned = ctx.immediate_submit(|command_buffer| {
            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::GENERAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE);
            ctx.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        });
        if let Err(e) = transitioned {
            destroy(ctx, record);
            return Err(e);
        }

        Ok(record)
    }
}

unsafe fn init_views(ctx: &GpuContext, record: &mut VulkanTexture) -> Result<()> {
    let desc = record.desc.clone();
    unsafe {
        record.view = create_view(ctx, record.image, &desc, view_type(&desc), full_range(&desc))?;
        record.attachment_view = if needs_attachment_view(&desc) {
            let range = full_range(&desc).level_count(1).layer_count(1);
            create_view(ctx, record.image, &desc, vk::ImageViewType::TYPE_2D, range)?
        } else {
            record.view
        };
    }
    Ok(())
}

/// Wrap a swap chain image; the swap chain keeps ownership of the image
pub(crate) fn wrap_swap_chain_image(ctx: &GpuContext, image: vk::Image, desc: &TextureDesc) -> Result<VulkanTexture> {
    let mut record = VulkanTexture {
        image,
        view: vk::ImageView::null(),
        attachment_view: vk::ImageView::null(),
        allocation: None,
        desc: desc.clone(),
        swap_chain_image: true,
    };
    unsafe { init_views(ctx, &mut record)? };
    Ok(record)
}

pub(crate) fn destroy(ctx: &GpuContext, mut record: VulkanTexture) {
    unsafe {
        if record.attachment_view != record.view && record.attachment_view != vk::ImageView::null() {
            ctx.device.destroy_image_view(record.attachment_view, None);
        }
        if record.view != vk::ImageView::null() {
            ctx.device.destroy_image_view(record.view, None);
        }
        if let Some(allocation) = record.allocation.take() {
            lock(&ctx.allocator).free(allocation).ok();
        }
        if !record.swap_chain_image {
            ctx.device.destroy_image(record.image, None);
        }
    }
}

pub(crate) fn create_sampler(ctx: &GpuContext, desc: &SamplerDesc) -> Result<VulkanSampler> {
    let address = address_mode_to_vk(desc.address_mode);
    let mipmap = match desc.min_filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    };
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(desc.mag_filter))
        .min_filter(filter_to_vk(desc.min_filter))
        .mipmap_mode(mipmap)
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .unnormalized_coordinates(false);

    let sampler = unsafe { ctx.device.create_sampler(&create_info, None) }
        .map_err(|e| vk_err("Failed to create sampler", e))?;
    Ok(VulkanSampler { sampler, desc: *desc })
}

pub(crate) fn destroy_sampler(ctx: &GpuContext, record: VulkanSampler) {
    unsafe { ctx.device.destroy_sampler(record.sampler, None) };
}

#[cfg(test)]
#[path = "vulkan_texture_tests.rs"]
mod tests;

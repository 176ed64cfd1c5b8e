/// Buffers - creation, host access and destruction

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use ten_rhi::rhi::device::{BufferDesc, BufferUsage, MemoryLocation};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::rhi_error;

use crate::vulkan_context::{lock, vk_err, GpuContext, SOURCE};
use crate::vulkan_format::{buffer_usage_to_vk, memory_location_to_gpu_allocator};
use crate::vulkan_resources::VulkanBuffer;

/// Memory the allocator is asked for
///
/// Host-visible buffers that only receive copies are readback targets and
/// prefer cached memory; every other host-visible buffer is an upload buffer.
pub(crate) fn allocation_location(desc: &BufferDesc) -> gpu_allocator::MemoryLocation {
    let location = desc.memory_location();
    let readback = location == MemoryLocation::HostVisible
        && desc.usage.contains(BufferUsage::COPY_DST)
        && !desc.usage.intersects(BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::UNIFORM);
    if readback {
        gpu_allocator::MemoryLocation::GpuToCpu
    } else {
        memory_location_to_gpu_allocator(location)
    }
}

/// Byte range `[offset, offset + len)` as a slice range, when it fits in `size`
pub(crate) fn host_range(offset: u64, len: u64, size: u64) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(Error::InvalidArgument(format!(
            "access of {} bytes at offset {} exceeds buffer size {}",
            len, offset, size
        ))),
    }
}

pub(crate) fn create(ctx: &GpuContext, desc: &BufferDesc) -> Result<VulkanBuffer> {
    unsafe {
        let buffer_create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = ctx
            .device
            .create_buffer(&buffer_create_info, None)
            .map_err(|e| vk_err(&format!("Failed to create buffer of size {} bytes", desc.size), e))?;

        let requirements = ctx.device.get_buffer_memory_requirements(buffer);
        let allocation = lock(&ctx.allocator).allocate(&AllocationCreateDesc {
            name: "ten_rhi buffer",
            requirements,
            location: allocation_location(desc),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(_) => {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                rhi_error!(SOURCE, "Out of GPU memory for buffer (required: {:.2} MB)", size_mb);
                ctx.device.destroy_buffer(buffer, None);
                return Err(Error::OutOfMemory);
            }
        };

        if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
            lock(&ctx.allocator).free(allocation).ok();
            ctx.device.destroy_buffer(buffer, None);
            return Err(vk_err("Failed to bind buffer memory", e));
        }

        Ok(VulkanBuffer { buffer, allocation: Some(allocation), desc: desc.clone() })
    }
}

fn require_host_visible(record: &VulkanBuffer, action: &str) -> Result<()> {
    if record.desc.memory_location() != MemoryLocation::HostVisible {
        return Err(Error::InvalidResource(format!(
            "buffer is device-local; {} through a staging buffer",
            action
        )));
    }
    Ok(())
}

/// Copy host data into a host-visible buffer
pub(crate) fn write(record: &mut VulkanBuffer, offset: u64, data: &[u8]) -> Result<()> {
    require_host_visible(record, "upload")?;
    let range = host_range(offset, data.len() as u64, record.desc.size)?;
    let mapped = record
        .allocation
        .as_mut()
        .and_then(|allocation| allocation.mapped_slice_mut())
        .ok_or_else(|| Error::BackendError("buffer memory is not mapped".to_string()))?;
    mapped[range].copy_from_slice(data);
    Ok(())
}

/// Copy bytes out of a host-visible buffer
pub(crate) fn read(record: &VulkanBuffer, offset: u64, size: u64) -> Result<Vec<u8>> {
    require_host_visible(record, "read back")?;
    let range = host_range(offset, size, record.desc.size)?;
    let mapped = record
        .allocation
        .as_ref()
        .and_then(|allocation| allocation.mapped_slice())
        .ok_or_else(|| Error::BackendError("buffer memory is not mapped".to_string()))?;
    Ok(mapped[range].to_vec())
}

pub(crate) fn destroy(ctx: &GpuContext, mut record: VulkanBuffer) {
    unsafe {
        if let Some(allocation) = record.allocation.take() {
            lock(&ctx.allocator).free(allocation).ok();
        }
        ctx.device.destroy_buffer(record.buffer, None);
    }
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;

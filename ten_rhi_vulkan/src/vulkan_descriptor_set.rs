/// Descriptor set layouts, pools and writes
///
/// Device sets come from a growable list of pools created with
/// FREE_DESCRIPTOR_SET so single sets can be returned. Command lists keep
/// their own pools for transient uniform sets and reset them at `begin`.

use ash::vk;
use ten_rhi::rhi::device::{DescriptorResource, DescriptorSetLayoutBinding, DescriptorSetLayoutDesc, DescriptorType};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::{rhi_error, rhi_info};

use crate::vulkan_context::{vk_err, SOURCE};
use crate::vulkan_format::{descriptor_type_to_vk, shader_stages_to_vk};
use crate::vulkan_resources::VulkanResources;

/// Sets per pool
pub(crate) const POOL_MAX_SETS: u32 = 1024;

/// Descriptor capacity of each pool
pub(crate) fn pool_sizes() -> [vk::DescriptorPoolSize; 4] {
    [
        vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLED_IMAGE, descriptor_count: 2048 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLER, descriptor_count: 1024 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: 1024 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: 1024 },
    ]
}

/// Growable list of descriptor pools
pub(crate) struct DescriptorPoolAllocator {
    pools: Vec<vk::DescriptorPool>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPoolAllocator {
    pub fn new(device: &ash::Device, flags: vk::DescriptorPoolCreateFlags) -> Result<Self> {
        let pool = Self::create_pool(device, flags)?;
        Ok(Self { pools: vec![pool], flags })
    }

    /// Create a pool with fixed capacity; called at creation and when the current pool is exhausted
    fn create_pool(device: &ash::Device, flags: vk::DescriptorPoolCreateFlags) -> Result<vk::DescriptorPool> {
        let pool_sizes = pool_sizes();
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .pool_sizes(&pool_sizes)
            .max_sets(POOL_MAX_SETS);
        unsafe { device.create_descriptor_pool(&info, None) }
            .map_err(|e| vk_err("Failed to create descriptor pool", e))
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Allocate one set, growing the pool list if the current pool is exhausted
    pub fn allocate(
        &mut self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorSet, vk::DescriptorPool)> {
        let layouts = [layout];
        let current_pool = match self.pools.last() {
            Some(&pool) => pool,
            None => {
                let pool = Self::create_pool(device, self.flags)?;
                self.pools.push(pool);
                pool
            }
        };
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(current_pool)
            .set_layouts(&layouts);

        match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => Ok((sets[0], current_pool)),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                let new_pool = Self::create_pool(device, self.flags)?;
                self.pools.push(new_pool);
                rhi_info!(SOURCE, "Descriptor pool exhausted, created new pool (total: {})", self.pools.len());
                let retry_info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(new_pool)
                    .set_layouts(&layouts);
                let sets = unsafe { device.allocate_descriptor_sets(&retry_info) }
                    .map_err(|e| vk_err("Failed to allocate descriptor set after pool growth", e))?;
                Ok((sets[0], new_pool))
            }
            Err(e) => Err(vk_err("Failed to allocate descriptor set", e)),
        }
    }

    /// Return one set to its pool
    pub fn free(&self, device: &ash::Device, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        if self.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            unsafe { device.free_descriptor_sets(pool, &[set]).ok() };
        }
    }

    /// Return every set of every pool
    pub fn reset(&mut self, device: &ash::Device) {
        for &pool in &self.pools {
            unsafe { device.reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty()).ok() };
        }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

pub(crate) fn layout_binding(binding: &DescriptorSetLayoutBinding) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding.binding)
        .descriptor_type(descriptor_type_to_vk(binding.ty))
        .descriptor_count(binding.count)
        .stage_flags(shader_stages_to_vk(binding.visible_stages()))
}

pub(crate) fn create_layout(device: &ash::Device, desc: &DescriptorSetLayoutDesc) -> Result<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc.bindings.iter().map(layout_binding).collect();
    let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&info, None) }
        .map_err(|e| vk_err("Failed to create descriptor set layout", e))
}

/// Layout without bindings, placed at set 0 when only set 1 is given
pub(crate) fn create_empty_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let info = vk::DescriptorSetLayoutCreateInfo::default();
    unsafe { device.create_descriptor_set_layout(&info, None) }.map_err(|e| {
        rhi_error!(SOURCE, "Failed to create empty descriptor set layout: {:?}", e);
        Error::InitializationFailed(format!("Failed to create empty descriptor set layout: {:?}", e))
    })
}

/// One resolved descriptor write
#[derive(Debug, Clone, Copy)]
pub(crate) enum NativeWrite {
    Buffer { binding: u32, ty: vk::DescriptorType, info: vk::DescriptorBufferInfo },
    Image { binding: u32, ty: vk::DescriptorType, info: vk::DescriptorImageInfo },
}

/// Buffer write for a binding of type `ty`
pub(crate) fn buffer_write(binding: u32, ty: DescriptorType, buffer: vk::Buffer, offset: u64, range: u64) -> NativeWrite {
    let range = if range == 0 { vk::WHOLE_SIZE } else { range };
    NativeWrite::Buffer {
        binding,
        ty: descriptor_type_to_vk(ty),
        info: vk::DescriptorBufferInfo { buffer, offset, range },
    }
}

/// Resolve a write against the object tables
///
/// `Err` carries the reason a write is ignored (traced by the caller).
pub(crate) fn resolve_write(
    resources: &VulkanResources,
    binding: &DescriptorSetLayoutBinding,
    resource: DescriptorResource,
) -> std::result::Result<NativeWrite, &'static str> {
    if !resource.fits(binding.ty) {
        return Err("resource kind does not match the binding type");
    }
    match resource {
        DescriptorResource::Buffer { buffer, offset, range } => {
            let record = resources.buffers.get(buffer).ok_or("stale buffer")?;
            Ok(buffer_write(binding.binding, binding.ty, record.buffer, offset, range))
        }
        DescriptorResource::Texture(texture) => {
            if binding.ty == DescriptorType::UnorderedAccess {
                return Err("storage textures are not supported");
            }
            let record = resources.textures.get(texture).ok_or("stale texture")?;
            Ok(NativeWrite::Image {
                binding: binding.binding,
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                info: vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: record.view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            })
        }
        DescriptorResource::Sampler(sampler) => {
            let record = resources.samplers.get(sampler).ok_or("stale sampler")?;
            Ok(NativeWrite::Image {
                binding: binding.binding,
                ty: vk::DescriptorType::SAMPLER,
                info: vk::DescriptorImageInfo {
                    sampler: record.sampler,
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                },
            })
        }
    }
}

/// Apply resolved writes and copies to a native set
pub(crate) fn apply(
    device: &ash::Device,
    set: vk::DescriptorSet,
    writes: &[NativeWrite],
    copies: &[vk::CopyDescriptorSet],
) {
    if writes.is_empty() && copies.is_empty() {
        return;
    }
    let native: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .map(|write| match write {
            NativeWrite::Buffer { binding, ty, info } => vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(*ty)
                .buffer_info(std::slice::from_ref(info)),
            NativeWrite::Image { binding, ty, info } => vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .dst_array_element(0)
                .descriptor_type(*ty)
                .image_info(std::slice::from_ref(info)),
        })
        .collect();
    unsafe { device.update_descriptor_sets(&native, copies) };
}

#[cfg(test)]
#[path = "vulkan_descriptor_set_tests.rs"]
mod tests;

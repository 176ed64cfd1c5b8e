/// Descriptor set layouts and writes

use bitflags::bitflags;
use crate::device::{BufferHandle, SamplerHandle, TextureHandle};
use crate::error::{Error, Result};

/// Maximum number of bindings in one layout
pub const MAX_DESCRIPTOR_SET_LAYOUT_BINDINGS: usize = 16;

/// Kind of resource a binding slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    UniformBuffer,
    /// Sampled texture (read-only)
    ShaderResource,
    /// Storage buffer or storage texture (read-write)
    UnorderedAccess,
}

bitflags! {
    /// Shader stages that can see a binding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
        const ALL = Self::ALL_GRAPHICS.bits() | Self::COMPUTE.bits();
    }
}

/// One slot of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    /// Array size (>= 1)
    pub count: u32,
    /// Empty means all stages
    pub stages: ShaderStageFlags,
}

impl DescriptorSetLayoutBinding {
    pub fn new(binding: u32, ty: DescriptorType) -> Self {
        Self { binding, ty, count: 1, stages: ShaderStageFlags::ALL }
    }

    /// Stages the binding is visible to, with empty meaning all
    pub fn visible_stages(&self) -> ShaderStageFlags {
        if self.stages.is_empty() { ShaderStageFlags::ALL } else { self.stages }
    }
}

/// Immutable binding schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutDesc {
    pub fn new(bindings: Vec<DescriptorSetLayoutBinding>) -> Self {
        Self { bindings }
    }

    /// Binding with the given index, if declared
    pub fn find(&self, binding: u32) -> Option<&DescriptorSetLayoutBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bindings.is_empty() {
            return Err(Error::InvalidArgument("descriptor set layout has no bindings".to_string()));
        }
        if self.bindings.len() > MAX_DESCRIPTOR_SET_LAYOUT_BINDINGS {
            return Err(Error::InvalidArgument(format!(
                "{} bindings exceed the maximum of {}",
                self.bindings.len(),
                MAX_DESCRIPTOR_SET_LAYOUT_BINDINGS
            )));
        }
        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.count == 0 {
                return Err(Error::InvalidArgument(format!(
                    "binding {} has a zero descriptor count",
                    binding.binding
                )));
            }
            if self.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return Err(Error::InvalidArgument(format!(
                    "binding {} is declared twice",
                    binding.binding
                )));
            }
        }
        Ok(())
    }
}

/// Resource placed into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    /// Buffer range; `range == 0` means "to the end of the buffer"
    Buffer { buffer: BufferHandle, offset: u64, range: u64 },
    Texture(TextureHandle),
    Sampler(SamplerHandle),
}

impl DescriptorResource {
    /// Whether the resource kind can fill a slot of type `ty`
    pub fn fits(&self, ty: DescriptorType) -> bool {
        match (self, ty) {
            (DescriptorResource::Sampler(_), DescriptorType::Sampler) => true,
            (DescriptorResource::Buffer { .. }, DescriptorType::UniformBuffer) => true,
            (DescriptorResource::Texture(_), DescriptorType::ShaderResource) => true,
            (DescriptorResource::Buffer { .. }, DescriptorType::UnorderedAccess) => true,
            (DescriptorResource::Texture(_), DescriptorType::UnorderedAccess) => true,
            _ => false,
        }
    }
}

/// One write of `Device::update_descriptor_set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    /// Whole-buffer write
    pub fn buffer(binding: u32, buffer: BufferHandle) -> Self {
        Self { binding, resource: DescriptorResource::Buffer { buffer, offset: 0, range: 0 } }
    }

    pub fn texture(binding: u32, texture: TextureHandle) -> Self {
        Self { binding, resource: DescriptorResource::Texture(texture) }
    }

    pub fn sampler(binding: u32, sampler: SamplerHandle) -> Self {
        Self { binding, resource: DescriptorResource::Sampler(sampler) }
    }
}

#[cfg(test)]
#[path = "descriptor_set_tests.rs"]
mod tests;

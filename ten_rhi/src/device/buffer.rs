/// Buffer descriptors and usage flags

use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::device::DeviceLimits;

bitflags! {
    /// How a buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX   = 1 << 0;
        const INDEX    = 1 << 1;
        const UNIFORM  = 1 << 2;
        const STORAGE  = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

/// Where the buffer memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// GPU-only memory; written through copy commands from a staging buffer
    DeviceLocal,
    /// CPU-mappable memory; written directly with `Device::update_buffer`
    HostVisible,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes (must be > 0)
    pub size: u64,
    /// Allowed usages
    pub usage: BufferUsage,
    /// Explicit memory residency; `None` derives it from `usage`
    pub location: Option<MemoryLocation>,
}

impl BufferDesc {
    /// Buffer with residency derived from its usage
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self { size, usage, location: None }
    }

    /// Host-visible upload buffer used as the source of a copy
    pub fn staging(size: u64) -> Self {
        Self { size, usage: BufferUsage::COPY_SRC, location: Some(MemoryLocation::HostVisible) }
    }

    /// Memory residency the backend must allocate
    ///
    /// Uniform buffers and pure copy sources are host-visible, everything
    /// else is device-local unless `location` says otherwise.
    pub fn memory_location(&self) -> MemoryLocation {
        if let Some(location) = self.location {
            return location;
        }
        if self.usage.contains(BufferUsage::UNIFORM) || self.usage == BufferUsage::COPY_SRC {
            MemoryLocation::HostVisible
        } else {
            MemoryLocation::DeviceLocal
        }
    }

    /// Check the descriptor against device limits
    pub fn validate(&self, limits: &DeviceLimits) -> Result<()> {
        if self.size == 0 {
            return Err(Error::InvalidArgument("buffer size must be non-zero".to_string()));
        }
        if self.size > limits.max_buffer_size {
            return Err(Error::InvalidArgument(format!(
                "buffer size {} exceeds device limit {}",
                self.size, limits.max_buffer_size
            )));
        }
        if self.usage.is_empty() {
            return Err(Error::InvalidArgument("buffer usage must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Index element width for `CommandList::set_index_buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size_in_bytes(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;

/// Generation-checked handles for every device-owned object
///
/// Each backend keeps one `HandleMap` per object type. A handle outlives the
/// object it names: once destroyed, lookups with it simply fail, and a
/// recycled slot never resolves an old handle. Handles also carry the id of
/// the device that created them, so another device never resolves them.

use std::sync::atomic::{AtomicU32, Ordering};
use slotmap::{Key, SlotMap};

/// Identity of one device instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Allocate a process-unique id (never 0, which default handles carry)
    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shape shared by every handle type
pub trait DeviceHandle: Copy {
    type Key: Key;

    fn from_parts(device: DeviceId, key: Self::Key) -> Self;

    /// Device that created the handle
    fn device(&self) -> DeviceId;

    fn key(&self) -> Self::Key;
}

macro_rules! device_handles {
    ($($(#[$meta:meta])* $name:ident => $key:ident;)*) => {
        /// Raw slot keys behind the public handles
        #[doc(hidden)]
        pub mod keys {
            slotmap::new_key_type! {
                $(pub struct $key;)*
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            pub struct $name {
                device: DeviceId,
                key: keys::$key,
            }

            impl DeviceHandle for $name {
                type Key = keys::$key;

                fn from_parts(device: DeviceId, key: Self::Key) -> Self {
                    Self { device, key }
                }

                fn device(&self) -> DeviceId {
                    self.device
                }

                fn key(&self) -> Self::Key {
                    self.key
                }
            }
        )*
    };
}

device_handles! {
    /// GPU buffer
    BufferHandle => BufferKey;
    /// GPU texture (also swap chain back buffers)
    TextureHandle => TextureKey;
    /// Texture sampler
    SamplerHandle => SamplerKey;
    /// Graphics or compute pipeline state object
    PsoHandle => PsoKey;
    DescriptorSetLayoutHandle => DescriptorSetLayoutKey;
    DescriptorSetHandle => DescriptorSetKey;
    RenderPassHandle => RenderPassKey;
    /// CPU-observable completion signal
    FenceHandle => FenceKey;
    /// GPU-GPU ordering token
    SemaphoreHandle => SemaphoreKey;
    SwapChainHandle => SwapChainKey;
}

/// Slot map owned by one device
///
/// Handles minted by another device (or default handles) resolve to nothing.
pub struct HandleMap<H: DeviceHandle, V> {
    device: DeviceId,
    slots: SlotMap<H::Key, V>,
}

impl<H: DeviceHandle, V> HandleMap<H, V> {
    pub fn new(device: DeviceId) -> Self {
        Self { device, slots: SlotMap::with_key() }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    fn key(&self, handle: H) -> Option<H::Key> {
        (handle.device() == self.device).then(|| handle.key())
    }

    pub fn insert(&mut self, value: V) -> H {
        H::from_parts(self.device, self.slots.insert(value))
    }

    pub fn contains_key(&self, handle: H) -> bool {
        self.key(handle).is_some_and(|key| self.slots.contains_key(key))
    }

    pub fn get(&self, handle: H) -> Option<&V> {
        self.slots.get(self.key(handle)?)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut V> {
        let key = self.key(handle)?;
        self.slots.get_mut(key)
    }

    /// Mutable access to several distinct live objects at once
    pub fn get_disjoint_mut<const N: usize>(&mut self, handles: [H; N]) -> Option<[&mut V; N]> {
        if handles.iter().any(|handle| handle.device() != self.device) {
            return None;
        }
        self.slots.get_disjoint_mut(handles.map(|handle| handle.key()))
    }

    pub fn remove(&mut self, handle: H) -> Option<V> {
        let key = self.key(handle)?;
        self.slots.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &V)> {
        let device = self.device;
        self.slots.iter().map(move |(key, value)| (H::from_parts(device, key), value))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.slots.values_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (H, V)> {
        let device = self.device;
        self.slots.drain().map(move |(key, value)| (H::from_parts(device, key), value))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
#[path = "handles_tests.rs"]
mod tests;

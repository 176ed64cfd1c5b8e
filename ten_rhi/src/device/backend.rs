/// Backend selection and configuration
///
/// There is no process-wide device. The application owns a `BackendRegistry`,
/// creates one device from it at startup and passes that device around.

use std::fmt;
use rustc_hash::FxHashMap;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::{rhi_error, rhi_info, rhi_warn};

/// Native API behind a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Vulkan,
    D3D12,
    D3D11,
    Metal,
    /// CPU reference implementation (headless, no GPU)
    Software,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Vulkan => "Vulkan",
            Backend::D3D12 => "Direct3D 12",
            Backend::D3D11 => "Direct3D 11",
            Backend::Metal => "Metal",
            Backend::Software => "Software",
        };
        f.write_str(name)
    }
}

/// Kind of work a queue accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Copy,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::Graphics, QueueType::Compute, QueueType::Copy];
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct RhiConfig {
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Backend tried first by `BackendRegistry::create_default_device`
    pub preferred_backend: Backend,
    /// Thread name prefix of the software backend's queue workers
    pub software_worker_name: String,
}

impl Default for RhiConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "TenEngine Application".to_string(),
            app_version: (1, 0, 0),
            preferred_backend: Backend::Vulkan,
            software_worker_name: "ten-rhi-queue".to_string(),
        }
    }
}

/// Backend factory function type
type BackendFactory = Box<dyn Fn(&RhiConfig) -> Result<Box<dyn Device>> + Send + Sync>;

/// Registry of available backends
pub struct BackendRegistry {
    factories: FxHashMap<Backend, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Registry with the software backend registered
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Backend::Software, |config| {
            Ok(Box::new(crate::software::SoftwareDevice::new(config)?) as Box<dyn Device>)
        });
        registry
    }

    /// Registry without any backend
    pub fn empty() -> Self {
        Self { factories: FxHashMap::default() }
    }

    /// Register (or replace) a backend factory
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend the factory creates devices for
    /// * `factory` - Factory function to create the device
    pub fn register<F>(&mut self, backend: Backend, factory: F)
    where
        F: Fn(&RhiConfig) -> Result<Box<dyn Device>> + Send + Sync + 'static,
    {
        self.factories.insert(backend, Box::new(factory));
    }

    pub fn is_registered(&self, backend: Backend) -> bool {
        self.factories.contains_key(&backend)
    }

    /// Create a device on one backend
    ///
    /// # Returns
    ///
    /// `Unsupported` when no factory is registered for `backend`
    pub fn create_device(&self, backend: Backend, config: &RhiConfig) -> Result<Box<dyn Device>> {
        let factory = match self.factories.get(&backend) {
            Some(factory) => factory,
            None => {
                rhi_error!("ten_rhi::backend", "Backend {} is not available in this build", backend);
                return Err(Error::Unsupported(format!("backend {}", backend)));
            }
        };
        let device = factory(config)?;
        rhi_info!("ten_rhi::backend", "Created {} device for '{}'", backend, config.app_name);
        Ok(device)
    }

    /// Create a device on the preferred backend, falling back to Vulkan then Software
    pub fn create_default_device(&self, config: &RhiConfig) -> Result<Box<dyn Device>> {
        let mut last_error = Error::Unsupported("no backend registered".to_string());
        let mut order = vec![config.preferred_backend];
        for backend in [Backend::Vulkan, Backend::Software] {
            if !order.contains(&backend) {
                order.push(backend);
            }
        }
        for backend in order {
            if !self.is_registered(backend) {
                continue;
            }
            match self.create_device(backend, config) {
                Ok(device) => return Ok(device),
                Err(e) => {
                    rhi_warn!("ten_rhi::backend", "{} device creation failed: {}", backend, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;

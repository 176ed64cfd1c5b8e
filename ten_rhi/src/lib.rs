/*!
# TenEngine RHI

Backend-agnostic Rendering Hardware Interface for TenEngine.

This crate defines the contract every graphics backend implements, using
trait-based dynamic dispatch: one backend is chosen when the device is
created and never switched afterwards.

## Architecture

- **Device**: root factory; creates every object and exposes queues
- **Queue**: executes submitted command lists in FIFO order
- **CommandList**: records draws, dispatches, copies, barriers and render passes
- **Handles**: generation-checked slot-map keys name buffers, textures, PSOs, fences, ...
- **BackendRegistry**: owned by the application; creates the device

The `Software` backend shipped here is a complete CPU implementation of the
contract. The Vulkan backend lives in the `ten_rhi_vulkan` crate.
*/

// Internal modules
mod error;
mod rhi_core;
pub mod log;
pub mod device;
pub mod software;

// Main rhi namespace module
pub mod rhi {
    // Error types
    pub use crate::error::{Error, Result};

    // Process-wide services (logging)
    pub use crate::rhi_core::Rhi;

    // Core contract at the namespace root
    pub use crate::device::{
        Backend, BackendRegistry, CommandList, Device, Queue, QueueType, RhiConfig,
    };

    // Logging sub-module (types only; the rhi_* macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Every contract type
    pub mod device {
        pub use crate::device::*;
    }

    // CPU reference backend
    pub mod software {
        pub use crate::software::*;
    }
}

/// Software backend - CPU reference implementation of the RHI
///
/// Headless and deterministic. Used by the test suites and by tools that
/// need the RHI without a GPU.

mod software_device;
mod software_resources;
mod software_command_list;
mod software_queue;
mod software_sync;

pub use software_device::SoftwareDevice;
pub use software_command_list::SoftwareCommandList;
pub use software_queue::{
    DrawRecord, ResolvedBinding, SoftwareQueue, SoftwareQueueStats, VertexBufferBinding,
};

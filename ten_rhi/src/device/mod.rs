/// Device module - the backend-agnostic RHI contract
///
/// Traits (`Device`, `Queue`, `CommandList`) are implemented by each backend.
/// Descriptor structs and enums are shared so that every backend validates
/// the same inputs the same way.

mod handles;
mod backend;
mod device;
mod queue;
mod command_list;
mod barrier;
mod buffer;
mod texture;
mod pipeline;
mod descriptor_set;
mod render_pass;
mod raytracing;
mod swapchain;

pub use handles::*;
pub use backend::*;
pub use device::*;
pub use queue::*;
pub use command_list::*;
pub use barrier::*;
pub use buffer::*;
pub use texture::*;
pub use pipeline::*;
pub use descriptor_set::*;
pub use render_pass::*;
pub use raytracing::*;
pub use swapchain::*;

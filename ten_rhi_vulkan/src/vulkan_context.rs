/// GpuContext - Vulkan instance, device, allocator and queues
///
/// One context is owned by each `VulkanDevice` (through `VulkanShared`).
/// Everything created from it is destroyed before the context itself drops.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ten_rhi::rhi::device::{QueueType, RhiConfig};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::{rhi_err, rhi_error, rhi_info, rhi_warn};

pub(crate) const SOURCE: &str = "ten_rhi::vulkan";

/// Largest buffer the RHI hands out, whatever the driver allows
pub(crate) const MAX_BUFFER_SIZE_CAP: u64 = 256 * 1024 * 1024;

/// Instance extensions enabled when the loader offers them, so that swap
/// chains can create surfaces for any window later on
const SURFACE_EXTENSIONS: [&CStr; 7] = [
    ash::khr::surface::NAME,
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

#[cfg(feature = "vulkan-validation")]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Lock a mutex, recovering the data if another thread panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Convert a failed Vulkan call into an RHI error (logged at Error)
pub(crate) fn vk_err(op: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            rhi_error!(SOURCE, "{}: out of memory ({:?})", op, result);
            Error::OutOfMemory
        }
        _ => rhi_err!(SOURCE, "{}: {:?}", op, result),
    }
}

/// Same as `vk_err`, for failures during device creation
fn init_err(op: &str, result: vk::Result) -> Error {
    rhi_error!(SOURCE, "{}: {:?}", op, result);
    Error::InitializationFailed(format!("{}: {:?}", op, result))
}

/// Shared GPU context
pub(crate) struct GpuContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    /// Driver limit on a single allocation (Vulkan 1.1 maintenance3)
    pub max_allocation_size: u64,
    pub device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Queue family every RHI queue is created in
    pub queue_family: u32,
    /// Native queues; submission to each must be externally synchronized
    pub queues: Vec<Arc<Mutex<vk::Queue>>>,
    /// Index into `queues` for Graphics, Compute and Copy
    queue_slots: [usize; 3],

    /// Reusable command pool for one-shot internal work (layout initialization)
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// `None` when the loader offers no surface extension
    pub surface_loader: Option<ash::khr::surface::Instance>,
    /// `None` when the device lacks VK_KHR_swapchain
    pub swapchain_loader: Option<ash::khr::swapchain::Device>,

    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<crate::vulkan_debug::DebugMessenger>,
}

impl GpuContext {
    /// Create instance, device, queues and allocator
    pub fn new(config: &RhiConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                rhi_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let (major, minor, patch) = config.app_version;
            let app_name = std::ffi::CString::new(config.app_name.replace('\0', ""))
                .unwrap_or_default();
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"TenEngine")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let available_extensions = entry
                .enumerate_instance_extension_properties(None)
                .map_err(|e| init_err("Failed to enumerate instance extensions", e))?;
            let is_available = |name: &CStr| {
                available_extensions
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str() == Ok(name))
            };

            #[allow(unused_mut)]
            let mut extension_names: Vec<*const c_char> = SURFACE_EXTENSIONS
                .iter()
                .filter(|name| is_available(name))
                .map(|name| name.as_ptr())
                .collect();
            let has_surface = is_available(ash::khr::surface::NAME);
            if !has_surface {
                rhi_warn!(SOURCE, "VK_KHR_surface unavailable: swap chains are disabled");
            }

            #[allow(unused_mut)]
            let mut layer_names: Vec<*const c_char> = Vec::new();
            let validation = Self::validation_requested(config) && {
                let enabled = Self::validation_layer_available(&entry);
                if !enabled {
                    rhi_warn!(SOURCE, "Validation requested but VK_LAYER_KHRONOS_validation is not installed");
                }
                enabled
            };
            #[cfg(feature = "vulkan-validation")]
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(VALIDATION_LAYER.as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_err("Failed to create Vulkan instance", e))?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if validation {
                match crate::vulkan_debug::DebugMessenger::new(&entry, &instance) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let picked = Self::pick_physical_device(&instance);
            let (physical_device, queue_family, queue_count) = match picked {
                Ok(picked) => picked,
                Err(e) => {
                    #[cfg(feature = "vulkan-validation")]
                    if let Some(messenger) = &debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(e);
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            let mut maintenance3 = vk::PhysicalDeviceMaintenance3Properties::default();
            let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut maintenance3);
            instance.get_physical_device_properties2(physical_device, &mut properties2);
            let max_allocation_size = maintenance3.max_memory_allocation_size;

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            // Up to one native queue per RHI queue type, all in the graphics family
            let queue_priorities = vec![1.0f32; queue_count as usize];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];

            let has_swapchain = has_surface
                && instance
                    .enumerate_device_extension_properties(physical_device)
                    .map(|exts| {
                        exts.iter()
                            .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME))
                    })
                    .unwrap_or(false);
            let device_extension_names: Vec<*const c_char> = if has_swapchain {
                vec![ash::khr::swapchain::NAME.as_ptr()]
            } else {
                Vec::new()
            };

            let device_features = vk::PhysicalDeviceFeatures::default();
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    #[cfg(feature = "vulkan-validation")]
                    if let Some(messenger) = &debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(init_err("Failed to create logical device", e));
                }
            };

            let queues: Vec<Arc<Mutex<vk::Queue>>> = (0..queue_count)
                .map(|index| Arc::new(Mutex::new(device.get_device_queue(queue_family, index))))
                .collect();
            let last = queues.len() - 1;
            let queue_slots = [0, 1.min(last), 2.min(last)];

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            });
            let allocator = match allocator {
                Ok(allocator) => allocator,
                Err(e) => {
                    rhi_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                    device.destroy_device(None);
                    #[cfg(feature = "vulkan-validation")]
                    if let Some(messenger) = &debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(Error::InitializationFailed(format!("Failed to create allocator: {:?}", e)));
                }
            };

            // TRANSIENT + RESET for reusable one-shot submissions
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = match device.create_command_pool(&upload_pool_create_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    drop(allocator);
                    device.destroy_device(None);
                    #[cfg(feature = "vulkan-validation")]
                    if let Some(messenger) = &debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                    return Err(init_err("Failed to create upload command pool", e));
                }
            };

            let surface_loader = has_surface.then(|| ash::khr::surface::Instance::new(&entry, &instance));
            let swapchain_loader = has_swapchain.then(|| ash::khr::swapchain::Device::new(&instance, &device));

            rhi_info!(
                SOURCE,
                "Vulkan device '{}' created ({} queue(s) in family {}, validation {})",
                device_name,
                queue_count,
                queue_family,
                if validation { "on" } else { "off" }
            );

            Ok(Self {
                entry,
                instance,
                physical_device,
                properties,
                max_allocation_size,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                queue_family,
                queues,
                queue_slots,
                upload_command_pool: Mutex::new(upload_command_pool),
                surface_loader,
                swapchain_loader,
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            })
        }
    }

    fn validation_requested(config: &RhiConfig) -> bool {
        cfg!(feature = "vulkan-validation") && config.enable_validation
    }

    #[cfg(feature = "vulkan-validation")]
    fn validation_layer_available(entry: &ash::Entry) -> bool {
        unsafe { entry.enumerate_instance_layer_properties() }
            .map(|layers| {
                layers
                    .iter()
                    .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER))
            })
            .unwrap_or(false)
    }

    #[cfg(not(feature = "vulkan-validation"))]
    fn validation_layer_available(_entry: &ash::Entry) -> bool {
        false
    }

    /// First device with a graphics queue family, discrete GPUs first
    ///
    /// Returns the device, the graphics family and how many queues to create in it.
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, u32)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| init_err("Failed to enumerate physical devices", e))?;

        let mut candidates: Vec<(vk::PhysicalDevice, u32, u32, bool)> = Vec::new();
        for physical_device in physical_devices {
            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let graphics = families.iter().enumerate().find(|(_, family)| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            });
            if let Some((index, family)) = graphics {
                let properties = unsafe { instance.get_physical_device_properties(physical_device) };
                let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                let count = family.queue_count.clamp(1, QueueType::ALL.len() as u32);
                candidates.push((physical_device, index as u32, count, discrete));
            }
        }
        candidates.sort_by_key(|&(_, _, _, discrete)| !discrete);
        candidates
            .first()
            .map(|&(device, family, count, _)| (device, family, count))
            .ok_or_else(|| {
                rhi_error!(SOURCE, "No Vulkan-capable GPU with a graphics queue found");
                Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
            })
    }

    /// Native queue backing an RHI queue type
    pub fn queue(&self, queue_type: QueueType) -> &Arc<Mutex<vk::Queue>> {
        let slot = match queue_type {
            QueueType::Graphics => self.queue_slots[0],
            QueueType::Compute => self.queue_slots[1],
            QueueType::Copy => self.queue_slots[2],
        };
        &self.queues[slot]
    }

    /// Record and run a one-shot command buffer on the graphics queue, waiting for completion
    pub fn immediate_submit<F: FnOnce(vk::CommandBuffer)>(&self, record: F) -> Result<()> {
        let pool = lock(&self.upload_command_pool);
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffers = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_err("Failed to allocate upload command buffer", e))?;
            let command_buffer = command_buffers[0];

            let result = self.run_one_shot(command_buffer, record);
            self.device.free_command_buffers(*pool, &command_buffers);
            result
        }
    }

    unsafe fn run_one_shot<F: FnOnce(vk::CommandBuffer)>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()> {
        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| vk_err("Failed to begin upload command buffer", e))?;
            record(command_buffer);
            self.device
                .end_command_buffer(command_buffer)
                .map_err(|e| vk_err("Failed to end upload command buffer", e))?;

            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| vk_err("Failed to create upload fence", e))?;
            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let submitted = {
                let queue = lock(self.queue(QueueType::Graphics));
                self.device.queue_submit(*queue, &[submit_info], fence)
            };
            let result = submitted
                .and_then(|_| self.device.wait_for_fences(&[fence], true, u64::MAX))
                .map_err(|e| vk_err("One-shot submission failed", e));
            self.device.destroy_fence(fence, None);
            result
        }
    }

    /// Wait until every native queue is idle
    pub fn wait_idle(&self) -> Result<()> {
        // vkDeviceWaitIdle needs every queue externally synchronized
        let _guards: Vec<MutexGuard<'_, vk::Queue>> = self.queues.iter().map(|queue| lock(queue)).collect();
        unsafe { self.device.device_wait_idle() }.map_err(|e| vk_err("Failed to wait idle", e))
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            let pool = *lock(&self.upload_command_pool);
            self.device.destroy_command_pool(pool, None);

            // Free VkDeviceMemory pages BEFORE destroying the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            #[cfg(feature = "vulkan-validation")]
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }

            self.instance.destroy_instance(None);
        }
    }
}

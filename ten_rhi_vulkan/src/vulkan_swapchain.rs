/// Swap chain - window surface plus a ring of back-buffer textures
///
/// Back buffers are registered as ordinary textures so command lists can
/// render into them and transition them with barriers. The next image is
/// acquired with a fence right after creation and after every present, so
/// `swap_chain_back_buffer` is always ready to record into.
///
/// `present` waits for the graphics queue before handing the image over; RHI
/// semaphores are not tied to the presentation engine.

use ash::vk;
use ten_rhi::rhi::device::{
    ColorSpace, HandleMap, SwapChainDesc, TextureDesc, TextureFormat, TextureHandle, TextureUsage, VSyncMode,
    QueueType,
};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::{rhi_debug, rhi_err, rhi_info, rhi_warn};

use crate::vulkan_context::{lock, vk_err, GpuContext};
use crate::vulkan_format::{choose_present_mode, choose_surface_format, texture_format_from_vk};
use crate::vulkan_resources::VulkanTexture;
use crate::vulkan_texture;

const SOURCE: &str = "ten_rhi::vulkan::swapchain";

pub(crate) struct VulkanSwapChain {
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    pub images: Vec<TextureHandle>,
    /// Index of the acquired image
    pub current: u32,
    pub extent: vk::Extent2D,
    /// Format actually used; may differ from `desc.format` when the surface lacks it
    pub format: TextureFormat,
    pub color_space: ColorSpace,
    pub vsync_mode: VSyncMode,
    pub desc: SwapChainDesc,
    acquire_fence: vk::Fence,
}

/// Result of (re)building the native swap chain
struct Built {
    swapchain: vk::SwapchainKHR,
    images: Vec<TextureHandle>,
    extent: vk::Extent2D,
    format: TextureFormat,
    color_space: ColorSpace,
}

/// Requested buffer count clamped to what the surface allows (0 = no maximum)
pub(crate) fn image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Surface extent, or the requested one clamped when the window manager lets us choose
pub(crate) fn choose_extent(width: u32, height: u32, caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Native usage of back buffers, limited to what the surface supports
pub(crate) fn image_usage(supported: vk::ImageUsageFlags) -> vk::ImageUsageFlags {
    let wanted = vk::ImageUsageFlags::COLOR_ATTACHMENT
        | vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST;
    (wanted & supported) | vk::ImageUsageFlags::COLOR_ATTACHMENT
}

/// RHI usage matching `image_usage`
pub(crate) fn texture_usage(native: vk::ImageUsageFlags) -> TextureUsage {
    let mut usage = TextureUsage::RENDER_TARGET;
    if native.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        usage |= TextureUsage::COPY_SRC;
    }
    if native.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        usage |= TextureUsage::COPY_DST;
    }
    usage
}

/// VSync mode reported for a descriptor
pub(crate) fn effective_vsync(desc: &SwapChainDesc) -> VSyncMode {
    if desc.vsync { desc.vsync_mode } else { VSyncMode::Off }
}

fn loaders(ctx: &GpuContext) -> Result<(&ash::khr::surface::Instance, &ash::khr::swapchain::Device)> {
    match (ctx.surface_loader.as_ref(), ctx.swapchain_loader.as_ref()) {
        (Some(surface), Some(swapchain)) => Ok((surface, swapchain)),
        _ => Err(Error::Unsupported("presentation extensions are not available on this device".to_string())),
    }
}

/// Create the surface, the native swap chain and its back-buffer textures
pub(crate) fn create(
    ctx: &GpuContext,
    textures: &mut HandleMap<TextureHandle, VulkanTexture>,
    desc: &SwapChainDesc,
) -> Result<VulkanSwapChain> {
    let Some(target) = desc.surface else {
        return Err(Error::InvalidArgument(
            "the Vulkan backend needs a window surface (headless swap chains are software-only)".to_string(),
        ));
    };
    let (surface_loader, _) = loaders(ctx)?;

    let surface = unsafe {
        ash_window::create_surface(&ctx.entry, &ctx.instance, target.display, target.window, None)
    }
    .map_err(|e| vk_err("Failed to create window surface", e))?;

    let supported = unsafe {
        surface_loader.get_physical_device_surface_support(ctx.physical_device, ctx.queue_family, surface)
    };
    if !matches!(supported, Ok(true)) {
        unsafe { surface_loader.destroy_surface(surface, None) };
        return Err(Error::Unsupported("the graphics queue cannot present to this surface".to_string()));
    }

    let acquire_fence = match unsafe { ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) } {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err(vk_err("Failed to create acquire fence", e));
        }
    };

    let mut swap_chain = VulkanSwapChain {
        surface,
        swapchain: vk::SwapchainKHR::null(),
        images: Vec::new(),
        current: 0,
        extent: vk::Extent2D { width: desc.width, height: desc.height },
        format: desc.format,
        color_space: desc.color_space,
        vsync_mode: effective_vsync(desc),
        desc: desc.clone(),
        acquire_fence,
    };
    if let Err(e) = rebuild(ctx, textures, &mut swap_chain) {
        destroy(ctx, textures, swap_chain);
        return Err(e);
    }
    rhi_info!(
        SOURCE,
        "Swap chain created: {}x{}, {} buffers, {:?}",
        swap_chain.extent.width,
        swap_chain.extent.height,
        swap_chain.images.len(),
        swap_chain.format
    );
    Ok(swap_chain)
}

fn build(
    ctx: &GpuContext,
    textures: &mut HandleMap<TextureHandle, VulkanTexture>,
    surface: vk::SurfaceKHR,
    desc: &SwapChainDesc,
    old: vk::SwapchainKHR,
) -> Result<Built> {
    let (surface_loader, swapchain_loader) = loaders(ctx)?;
    let (caps, formats, modes) = unsafe {
        let caps = surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, surface)
            .map_err(|e| vk_err("Failed to get surface capabilities", e))?;
        let formats = surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, surface)
            .map_err(|e| vk_err("Failed to get surface formats", e))?;
        let modes = surface_loader
            .get_physical_device_surface_present_modes(ctx.physical_device, surface)
            .map_err(|e| vk_err("Failed to get present modes", e))?;
        (caps, formats, modes)
    };

    let Some((surface_format, color_space)) = choose_surface_format(desc.format, desc.color_space, &formats) else {
        return Err(rhi_err!(SOURCE, "Surface reports no formats"));
    };
    let Some(format) = texture_format_from_vk(surface_format.format) else {
        return Err(Error::Unsupported(format!("surface format {:?} has no RHI equivalent", surface_format.format)));
    };
    if format != desc.format || color_space != desc.color_space {
        rhi_warn!(
            SOURCE,
            "Swap chain uses {:?}/{:?} instead of the requested {:?}/{:?}",
            format,
            color_space,
            desc.format,
            desc.color_space
        );
    }

    let present_mode = choose_present_mode(desc.requested_present_mode(), &modes);
    let extent = choose_extent(desc.width, desc.height, &caps);
    let usage = image_usage(caps.supported_usage_flags);
    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count(desc.buffer_count, &caps))
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(usage)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(|e| vk_err("Failed to create swap chain", e))?;
    let native_images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(vk_err("Failed to get swap chain images", e));
        }
    };

    let image_desc = TextureDesc {
        usage: texture_usage(usage),
        ..TextureDesc::new_2d(extent.width, extent.height, format)
    };
    let mut images = Vec::with_capacity(native_images.len());
    for image in native_images {
        match vulkan_texture::wrap_swap_chain_image(ctx, image, &image_desc) {
            Ok(record) => images.push(textures.insert(record)),
            Err(e) => {
                for handle in images {
                    if let Some(record) = textures.remove(handle) {
                        vulkan_texture::destroy(ctx, record);
                    }
                }
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        }
    }
    rhi_debug!(SOURCE, "Swap chain built with present mode {:?}", present_mode);
    Ok(Built { swapchain, images, extent, format, color_space })
}

fn release_images(ctx: &GpuContext, textures: &mut HandleMap<TextureHandle, VulkanTexture>, swap_chain: &mut VulkanSwapChain) {
    for handle in swap_chain.images.drain(..) {
        if let Some(record) = textures.remove(handle) {
            vulkan_texture::destroy(ctx, record);
        }
    }
}

/// Acquire the next image into `current`, blocking until it is ready
fn acquire(ctx: &GpuContext, swap_chain: &mut VulkanSwapChain) -> Result<()> {
    let (_, swapchain_loader) = loaders(ctx)?;
    unsafe {
        let acquired = swapchain_loader.acquire_next_image(
            swap_chain.swapchain,
            u64::MAX,
            vk::Semaphore::null(),
            swap_chain.acquire_fence,
        );
        let index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    rhi_debug!(SOURCE, "Acquired image {} from a suboptimal swap chain", index);
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                rhi_warn!(SOURCE, "Swap chain out of date during acquire; resize it");
                return Err(Error::BackendError("swap chain out of date".to_string()));
            }
            Err(e) => return Err(vk_err("Failed to acquire swap chain image", e)),
        };
        ctx.device
            .wait_for_fences(&[swap_chain.acquire_fence], true, u64::MAX)
            .and_then(|_| ctx.device.reset_fences(&[swap_chain.acquire_fence]))
            .map_err(|e| vk_err("Failed to wait for image acquisition", e))?;
        swap_chain.current = index;
    }
    Ok(())
}

/// Recreate the native swap chain from `swap_chain.desc`, replacing its textures
pub(crate) fn rebuild(
    ctx: &GpuContext,
    textures: &mut HandleMap<TextureHandle, VulkanTexture>,
    swap_chain: &mut VulkanSwapChain,
) -> Result<()> {
    let old = swap_chain.swapchain;
    if old != vk::SwapchainKHR::null() {
        // Old images may still be in flight
        ctx.wait_idle()?;
    }
    let built = build(ctx, textures, swap_chain.surface, &swap_chain.desc, old)?;
    release_images(ctx, textures, swap_chain);
    if old != vk::SwapchainKHR::null() {
        if let Ok((_, swapchain_loader)) = loaders(ctx) {
            unsafe { swapchain_loader.destroy_swapchain(old, None) };
        }
    }
    swap_chain.swapchain = built.swapchain;
    swap_chain.images = built.images;
    swap_chain.extent = built.extent;
    swap_chain.format = built.format;
    swap_chain.color_space = built.color_space;
    swap_chain.vsync_mode = effective_vsync(&swap_chain.desc);
    acquire(ctx, swap_chain)
}

/// Present the current image, then acquire the next one
pub(crate) fn present(ctx: &GpuContext, swap_chain: &mut VulkanSwapChain) -> Result<()> {
    let (_, swapchain_loader) = loaders(ctx)?;
    let swapchains = [swap_chain.swapchain];
    let image_indices = [swap_chain.current];
    let present_info = vk::PresentInfoKHR::default()
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    let presented = {
        let queue = lock(ctx.queue(QueueType::Graphics));
        unsafe {
            ctx.device
                .queue_wait_idle(*queue)
                .and_then(|_| swapchain_loader.queue_present(*queue, &present_info))
        }
    };
    match presented {
        Ok(false) => {}
        Ok(true) => rhi_debug!(SOURCE, "Presented to a suboptimal swap chain"),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            rhi_warn!(SOURCE, "Swap chain out of date during present; resize it");
            return Err(Error::BackendError("swap chain out of date".to_string()));
        }
        Err(e) => return Err(vk_err("Failed to present", e)),
    }
    acquire(ctx, swap_chain)
}

/// Destroy the textures, the native swap chain and the surface
pub(crate) fn destroy(ctx: &GpuContext, textures: &mut HandleMap<TextureHandle, VulkanTexture>, mut swap_chain: VulkanSwapChain) {
    release_images(ctx, textures, &mut swap_chain);
    unsafe {
        ctx.device.destroy_fence(swap_chain.acquire_fence, None);
        if let Ok((surface_loader, swapchain_loader)) = loaders(ctx) {
            if swap_chain.swapchain != vk::SwapchainKHR::null() {
                swapchain_loader.destroy_swapchain(swap_chain.swapchain, None);
            }
            surface_loader.destroy_surface(swap_chain.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;

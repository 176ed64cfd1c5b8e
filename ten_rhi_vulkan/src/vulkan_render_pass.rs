/// Render passes and transient framebuffers
///
/// Color attachments come first in the native attachment list, followed by the
/// depth/stencil attachment when present. Attachments leave a pass in their
/// attachment layout; moving them elsewhere is an explicit barrier.

use ash::vk;
use rustc_hash::FxHashMap;
use ten_rhi::rhi::device::{AttachmentDesc, LoadOp, RenderPassDesc, StoreOp, TextureFormat};
use ten_rhi::rhi::Result;

use crate::vulkan_context::vk_err;
use crate::vulkan_format::{load_op_to_vk, store_op_to_vk, texture_format_to_vk};

/// Layout an attachment is used in during the pass
pub(crate) fn attachment_layout(format: TextureFormat) -> vk::ImageLayout {
    if format.is_depth() {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    }
}

/// Loaded attachments must already be in their attachment layout; others start UNDEFINED
pub(crate) fn initial_layout(attachment: &AttachmentDesc) -> vk::ImageLayout {
    match attachment.load_op {
        LoadOp::Load => attachment_layout(attachment.format),
        LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
    }
}

pub(crate) fn attachment_description(attachment: &AttachmentDesc) -> vk::AttachmentDescription {
    let (stencil_load, stencil_store) = if attachment.format.has_stencil() {
        (load_op_to_vk(attachment.load_op), store_op_to_vk(attachment.store_op))
    } else {
        (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
    };
    vk::AttachmentDescription::default()
        .format(texture_format_to_vk(attachment.format))
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op_to_vk(attachment.load_op))
        .store_op(store_op_to_vk(attachment.store_op))
        .stencil_load_op(stencil_load)
        .stencil_store_op(stencil_store)
        .initial_layout(initial_layout(attachment))
        .final_layout(attachment_layout(attachment.format))
}

/// External dependency into subpass 0, then one by-region dependency per subpass boundary
pub(crate) fn subpass_dependencies(subpass_count: u32) -> Vec<vk::SubpassDependency> {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_writes = vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let mut dependencies = vec![vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(attachment_stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(attachment_stages)
        .dst_access_mask(attachment_writes)];

    for subpass in 1..subpass_count {
        dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(subpass - 1)
                .dst_subpass(subpass)
                .src_stage_mask(attachment_stages)
                .src_access_mask(attachment_writes)
                .dst_stage_mask(attachment_stages | vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(
                    attachment_writes
                        | vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::SHADER_READ,
                )
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        );
    }
    dependencies
}

/// Attachment references of every subpass
pub(crate) struct SubpassReferences {
    pub colors: Vec<Vec<vk::AttachmentReference>>,
    pub depth: Vec<Option<vk::AttachmentReference>>,
}

pub(crate) fn subpass_references(desc: &RenderPassDesc) -> SubpassReferences {
    let depth_index = desc.color_attachments.len() as u32;
    let colors = desc
        .subpasses
        .iter()
        .map(|subpass| {
            subpass
                .color_attachments
                .iter()
                .map(|&index| {
                    vk::AttachmentReference::default()
                        .attachment(index)
                        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                })
                .collect()
        })
        .collect();
    let depth = desc
        .subpasses
        .iter()
        .map(|subpass| {
            (subpass.depth_stencil && desc.depth_stencil_attachment.is_some()).then(|| {
                vk::AttachmentReference::default()
                    .attachment(depth_index)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            })
        })
        .collect();
    SubpassReferences { colors, depth }
}

/// Create the native pass of a validated descriptor
pub(crate) fn create(device: &ash::Device, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
    let attachments: Vec<vk::AttachmentDescription> = desc
        .color_attachments
        .iter()
        .chain(desc.depth_stencil_attachment.iter())
        .map(attachment_description)
        .collect();

    let references = subpass_references(desc);
    let subpasses: Vec<vk::SubpassDescription> = references
        .colors
        .iter()
        .zip(&references.depth)
        .map(|(colors, depth)| {
            let subpass = vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(colors);
            match depth {
                Some(depth) => subpass.depth_stencil_attachment(depth),
                None => subpass,
            }
        })
        .collect();

    let dependencies = subpass_dependencies(desc.subpass_count());
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(|e| vk_err("Failed to create render pass", e))
}

/// Single-subpass descriptor inferred from the attachments bound at begin time
pub(crate) fn implicit_desc(
    colors: &[(TextureFormat, LoadOp, StoreOp)],
    depth: Option<(TextureFormat, LoadOp, StoreOp)>,
) -> RenderPassDesc {
    let attachment = |(format, load_op, store_op): (TextureFormat, LoadOp, StoreOp)| AttachmentDesc {
        format,
        load_op,
        store_op,
    };
    RenderPassDesc::single_subpass(colors.iter().copied().map(attachment).collect(), depth.map(attachment))
}

/// Native passes created for `begin_render_pass` without an explicit pass
#[derive(Default)]
pub(crate) struct ImplicitPassCache {
    passes: FxHashMap<RenderPassDesc, vk::RenderPass>,
}

impl ImplicitPassCache {
    pub fn get_or_create(&mut self, device: &ash::Device, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        if let Some(&render_pass) = self.passes.get(desc) {
            return Ok(render_pass);
        }
        let render_pass = create(device, desc)?;
        self.passes.insert(desc.clone(), render_pass);
        Ok(render_pass)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for (_, render_pass) in self.passes.drain() {
            unsafe { device.destroy_render_pass(render_pass, None) };
        }
    }
}

/// Framebuffer extent: the smallest attachment wins
pub(crate) fn framebuffer_extent(extents: &[(u32, u32)]) -> vk::Extent2D {
    let width = extents.iter().map(|&(w, _)| w).min().unwrap_or(1);
    let height = extents.iter().map(|&(_, h)| h).min().unwrap_or(1);
    vk::Extent2D { width, height }
}

pub(crate) fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer> {
    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(views)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    unsafe { device.create_framebuffer(&framebuffer_info, None) }
        .map_err(|e| vk_err("Failed to create framebuffer", e))
}

#[cfg(test)]
#[path = "vulkan_render_pass_tests.rs"]
mod tests;

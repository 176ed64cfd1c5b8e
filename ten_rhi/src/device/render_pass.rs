/// Render pass topology and begin-time attachments

use crate::device::{TextureFormat, TextureHandle};
use crate::error::{Error, Result};

/// Maximum number of color attachments in a pass
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Maximum number of subpasses in a pass
pub const MAX_SUBPASSES: usize = 8;

/// What happens to an attachment at the start of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

/// What happens to an attachment at the end of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

/// Attachment declaration of a render pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl AttachmentDesc {
    pub fn new(format: TextureFormat) -> Self {
        Self { format, load_op: LoadOp::Clear, store_op: StoreOp::Store }
    }
}

/// One subpass: which color attachments it writes and whether it uses depth
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpassDesc {
    /// Indices into `RenderPassDesc::color_attachments`
    pub color_attachments: Vec<u32>,
    pub depth_stencil: bool,
}

/// Descriptor for a render pass object
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_stencil_attachment: Option<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
}

impl RenderPassDesc {
    /// One subpass writing every color attachment (and depth, when present)
    pub fn single_subpass(
        color_attachments: Vec<AttachmentDesc>,
        depth_stencil_attachment: Option<AttachmentDesc>,
    ) -> Self {
        let subpass = SubpassDesc {
            color_attachments: (0..color_attachments.len() as u32).collect(),
            depth_stencil: depth_stencil_attachment.is_some(),
        };
        Self { color_attachments, depth_stencil_attachment, subpasses: vec![subpass] }
    }

    pub fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.color_attachments.is_empty() && self.depth_stencil_attachment.is_none() {
            return Err(Error::InvalidArgument("render pass has no attachments".to_string()));
        }
        if self.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidArgument(format!(
                "{} color attachments exceed the maximum of {}",
                self.color_attachments.len(),
                MAX_COLOR_ATTACHMENTS
            )));
        }
        if self.subpasses.is_empty() || self.subpasses.len() > MAX_SUBPASSES {
            return Err(Error::InvalidArgument(format!(
                "render pass needs 1..={} subpasses, got {}",
                MAX_SUBPASSES,
                self.subpasses.len()
            )));
        }
        if let Some(depth) = &self.depth_stencil_attachment {
            if !depth.format.is_depth() {
                return Err(Error::InvalidArgument(format!(
                    "depth/stencil attachment has color format {:?}",
                    depth.format
                )));
            }
        }
        for (index, subpass) in self.subpasses.iter().enumerate() {
            if let Some(bad) = subpass
                .color_attachments
                .iter()
                .find(|&&a| a as usize >= self.color_attachments.len())
            {
                return Err(Error::InvalidArgument(format!(
                    "subpass {} references color attachment {} of {}",
                    index,
                    bad,
                    self.color_attachments.len()
                )));
            }
            if subpass.depth_stencil && self.depth_stencil_attachment.is_none() {
                return Err(Error::InvalidArgument(format!(
                    "subpass {} uses depth but the pass declares none",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Color target bound by `CommandList::begin_render_pass`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Clear to `clear_color`, then store
    pub fn clear(texture: TextureHandle, clear_color: [f32; 4]) -> Self {
        Self { texture, load_op: LoadOp::Clear, store_op: StoreOp::Store, clear_color }
    }
}

/// Depth/stencil target bound by `CommandList::begin_render_pass`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: TextureHandle,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Attachments for one render pass instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPassBeginDesc {
    /// 1..=8 color targets
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

impl RenderPassBeginDesc {
    pub fn validate(&self) -> Result<()> {
        let count = self.color_attachments.len();
        if count == 0 || count > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidArgument(format!(
                "begin_render_pass needs 1..={} color attachments, got {}",
                MAX_COLOR_ATTACHMENTS, count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "render_pass_tests.rs"]
mod tests;

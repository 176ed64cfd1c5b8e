/// Object storage of the software backend
///
/// Every object lives in a slot map guarded by one mutex on the shared device
/// state. Buffers and textures are plain byte vectors.

use std::sync::Arc;
use rustc_hash::FxHashMap;
use crate::device::{
    BufferDesc, BufferHandle, DescriptorResource, DescriptorSetHandle, DescriptorSetLayoutDesc, DeviceId, HandleMap,
    DescriptorSetLayoutHandle, FenceHandle, PipelineKind, PsoHandle, RenderPassDesc,
    RenderPassHandle, SamplerDesc, SamplerHandle, SemaphoreHandle, SwapChainDesc,
    SwapChainHandle, TextureDesc, TextureFormat, TextureHandle, TextureRegion, VSyncMode,
};
use crate::error::{Error, Result};
use crate::software::software_sync::{SoftwareFence, SoftwareSemaphore};

pub(crate) struct SoftwareBuffer {
    pub desc: BufferDesc,
    pub data: Vec<u8>,
}

pub(crate) struct SoftwareTexture {
    pub desc: TextureDesc,
    /// One byte vector per subresource, indexed by `layer * mip_levels + mip`
    pub subresources: Vec<Vec<u8>>,
}

/// Host memory one software texture may occupy (every mip and layer)
pub(crate) const MAX_TEXTURE_BYTES: u64 = 1 << 30;

impl SoftwareTexture {
    pub fn new(desc: TextureDesc) -> Result<Self> {
        match desc.size_in_bytes() {
            Some(size) if size <= MAX_TEXTURE_BYTES => {}
            _ => return Err(Error::OutOfMemory),
        }
        let count = desc.array_layers as usize * desc.mip_levels as usize;
        let mut subresources = Vec::with_capacity(count);
        for _layer in 0..desc.array_layers {
            for mip in 0..desc.mip_levels {
                subresources.push(vec![0u8; desc.mip_size_in_bytes(mip) as usize]);
            }
        }
        Ok(Self { desc, subresources })
    }

    /// Extent of a mip level
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.desc.width >> mip).max(1),
            (self.desc.height >> mip).max(1),
            (self.desc.depth >> mip).max(1),
        )
    }

    fn subresource_index(&self, region: &TextureRegion) -> Result<usize> {
        if region.mip_level >= self.desc.mip_levels || region.array_layer >= self.desc.array_layers {
            return Err(Error::InvalidArgument(format!(
                "subresource mip {} layer {} out of range",
                region.mip_level, region.array_layer
            )));
        }
        let (w, h, d) = self.mip_extent(region.mip_level);
        let fits = |start: u32, len: u32, max: u32| len > 0 && start.checked_add(len).is_some_and(|end| end <= max);
        if !fits(region.x, region.width, w) || !fits(region.y, region.height, h) || !fits(region.z, region.depth, d) {
            return Err(Error::InvalidArgument(format!(
                "region {}x{}x{} at ({}, {}, {}) exceeds mip extent {}x{}x{}",
                region.width, region.height, region.depth, region.x, region.y, region.z, w, h, d
            )));
        }
        Ok((region.array_layer * self.desc.mip_levels + region.mip_level) as usize)
    }

    /// Byte offset of each row of the region inside its subresource
    fn row_offsets(&self, region: &TextureRegion) -> impl Iterator<Item = usize> {
        let (w, h, _) = self.mip_extent(region.mip_level);
        let bpp = self.desc.format.bytes_per_texel() as usize;
        let (w, h) = (w as usize, h as usize);
        let region = *region;
        (0..region.depth as usize).flat_map(move |z| {
            (0..region.height as usize).map(move |y| {
                let slice = region.z as usize + z;
                let row = region.y as usize + y;
                ((slice * h + row) * w + region.x as usize) * bpp
            })
        })
    }

    /// Write tightly packed texels into a region
    pub fn write_region(&mut self, region: &TextureRegion, src: &[u8]) -> Result<()> {
        let index = self.subresource_index(region)?;
        let row_bytes = region.width as usize * self.desc.format.bytes_per_texel() as usize;
        let offsets: Vec<usize> = self.row_offsets(region).collect();
        if src.len() < offsets.len() * row_bytes {
            return Err(Error::InvalidArgument("source data smaller than the texture region".to_string()));
        }
        let target = &mut self.subresources[index];
        for (row, offset) in offsets.into_iter().enumerate() {
            target[offset..offset + row_bytes].copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
        }
        Ok(())
    }

    /// Read a region as tightly packed texels
    pub fn read_region(&self, region: &TextureRegion) -> Result<Vec<u8>> {
        let index = self.subresource_index(region)?;
        let row_bytes = region.width as usize * self.desc.format.bytes_per_texel() as usize;
        let source = &self.subresources[index];
        let mut out = Vec::with_capacity(region.texel_count() as usize * self.desc.format.bytes_per_texel() as usize);
        for offset in self.row_offsets(region) {
            out.extend_from_slice(&source[offset..offset + row_bytes]);
        }
        Ok(out)
    }

    /// Fill mip 0 of layer 0 with one encoded texel
    pub fn fill(&mut self, texel: &[u8]) {
        if texel.is_empty() {
            return;
        }
        if let Some(first) = self.subresources.first_mut() {
            for chunk in first.chunks_exact_mut(texel.len()) {
                chunk.copy_from_slice(texel);
            }
        }
    }
}

/// Encode a clear color as one texel of `format`
pub(crate) fn encode_clear_color(format: TextureFormat, color: [f32; 4]) -> Vec<u8> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        TextureFormat::R8_UNORM => vec![unorm(color[0])],
        TextureFormat::R8G8_UNORM => vec![unorm(color[0]), unorm(color[1])],
        TextureFormat::R8G8B8A8_UNORM | TextureFormat::R8G8B8A8_SRGB => {
            color.iter().map(|&c| unorm(c)).collect()
        }
        TextureFormat::B8G8R8A8_UNORM | TextureFormat::B8G8R8A8_SRGB => {
            vec![unorm(color[2]), unorm(color[1]), unorm(color[0]), unorm(color[3])]
        }
        TextureFormat::R16G16B16A16_SFLOAT => {
            color.iter().flat_map(|&c| f32_to_f16_bits(c).to_le_bytes()).collect()
        }
        TextureFormat::R32_SFLOAT => color[0].to_le_bytes().to_vec(),
        TextureFormat::R32G32B32A32_SFLOAT => bytemuck::cast_slice(&color).to_vec(),
        TextureFormat::D16_UNORM | TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_FLOAT => {
            encode_clear_depth(format, color[0], 0)
        }
    }
}

/// Encode a depth/stencil clear value as one texel of `format`
pub(crate) fn encode_clear_depth(format: TextureFormat, depth: f32, stencil: u32) -> Vec<u8> {
    let depth = depth.clamp(0.0, 1.0);
    match format {
        TextureFormat::D16_UNORM => ((depth * 65535.0).round() as u16).to_le_bytes().to_vec(),
        TextureFormat::D24_UNORM_S8_UINT => {
            let packed = ((depth * 16_777_215.0).round() as u32) | ((stencil & 0xFF) << 24);
            packed.to_le_bytes().to_vec()
        }
        _ => depth.to_le_bytes().to_vec(),
    }
}

/// IEEE half-float bits (round toward zero, no denormals)
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32 - 127 + 15;
    let mantissa = ((bits >> 13) & 0x3FF) as u16;
    if exponent <= 0 {
        sign
    } else if exponent >= 31 {
        sign | 0x7C00
    } else {
        sign | ((exponent as u16) << 10) | mantissa
    }
}

pub(crate) struct SoftwarePso {
    pub kind: PipelineKind,
    /// Layouts at set 0 and set 1
    pub layouts: [Option<DescriptorSetLayoutHandle>; 2],
    pub render_pass: Option<RenderPassHandle>,
    pub subpass: u32,
}

pub(crate) struct SoftwareDescriptorSet {
    /// Copy of the layout schema, so the set stays usable if the layout is destroyed
    pub schema: DescriptorSetLayoutDesc,
    pub slots: FxHashMap<u32, DescriptorResource>,
}

pub(crate) struct SoftwareSwapChain {
    pub desc: SwapChainDesc,
    pub images: Vec<TextureHandle>,
    pub current: u32,
    pub vsync_mode: VSyncMode,
}

/// Every object of one software device
pub(crate) struct SoftwareResources {
    pub buffers: HandleMap<BufferHandle, SoftwareBuffer>,
    pub textures: HandleMap<TextureHandle, SoftwareTexture>,
    pub samplers: HandleMap<SamplerHandle, SamplerDesc>,
    pub psos: HandleMap<PsoHandle, SoftwarePso>,
    pub layouts: HandleMap<DescriptorSetLayoutHandle, DescriptorSetLayoutDesc>,
    pub sets: HandleMap<DescriptorSetHandle, SoftwareDescriptorSet>,
    pub render_passes: HandleMap<RenderPassHandle, RenderPassDesc>,
    pub fences: HandleMap<FenceHandle, Arc<SoftwareFence>>,
    pub semaphores: HandleMap<SemaphoreHandle, Arc<SoftwareSemaphore>>,
    pub swap_chains: HandleMap<SwapChainHandle, SoftwareSwapChain>,
}

impl SoftwareResources {
    pub fn new(device: DeviceId) -> Self {
        Self {
            buffers: HandleMap::new(device),
            textures: HandleMap::new(device),
            samplers: HandleMap::new(device),
            psos: HandleMap::new(device),
            layouts: HandleMap::new(device),
            sets: HandleMap::new(device),
            render_passes: HandleMap::new(device),
            fences: HandleMap::new(device),
            semaphores: HandleMap::new(device),
            swap_chains: HandleMap::new(device),
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&SoftwareBuffer> {
        self.buffers
            .get(handle)
            .ok_or_else(|| Error::InvalidResource(format!("stale buffer handle {:?}", handle)))
    }

    fn texture(&self, handle: TextureHandle) -> Result<&SoftwareTexture> {
        self.textures
            .get(handle)
            .ok_or_else(|| Error::InvalidResource(format!("stale texture handle {:?}", handle)))
    }

    /// Copy bytes between (possibly identical) buffers
    pub fn copy_buffer(&mut self, src: BufferHandle, src_offset: u64, dst: BufferHandle, dst_offset: u64, size: u64) -> Result<()> {
        let src_len = self.buffer(src)?.data.len() as u64;
        let dst_len = self.buffer(dst)?.data.len() as u64;
        let in_range = |offset: u64, len: u64| offset.checked_add(size).is_some_and(|end| end <= len);
        if size == 0 || !in_range(src_offset, src_len) || !in_range(dst_offset, dst_len) {
            return Err(Error::InvalidArgument(format!(
                "copy of {} bytes from offset {} to offset {} is out of range",
                size, src_offset, dst_offset
            )));
        }
        let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
        if src == dst {
            if let Some(buffer) = self.buffers.get_mut(dst) {
                buffer.data.copy_within(s..s + n, d);
            }
        } else if let Some([from, to]) = self.buffers.get_disjoint_mut([src, dst]) {
            to.data[d..d + n].copy_from_slice(&from.data[s..s + n]);
        }
        Ok(())
    }

    pub fn copy_buffer_to_texture(&mut self, src: BufferHandle, src_offset: u64, dst: TextureHandle, region: &TextureRegion) -> Result<()> {
        let bpp = self.texture(dst)?.desc.format.bytes_per_texel() as u64;
        let size = region.texel_count() * bpp;
        let data = &self.buffer(src)?.data;
        let end = src_offset.checked_add(size).filter(|&end| end <= data.len() as u64).ok_or_else(|| {
            Error::InvalidArgument(format!("buffer too small for a {} byte texture upload", size))
        })?;
        let bytes = data[src_offset as usize..end as usize].to_vec();
        match self.textures.get_mut(dst) {
            Some(texture) => texture.write_region(region, &bytes),
            None => Err(Error::InvalidResource(format!("stale texture handle {:?}", dst))),
        }
    }

    pub fn copy_texture_to_buffer(&mut self, src: TextureHandle, region: &TextureRegion, dst: BufferHandle, dst_offset: u64) -> Result<()> {
        let bytes = self.texture(src)?.read_region(region)?;
        let buffer = self
            .buffers
            .get_mut(dst)
            .ok_or_else(|| Error::InvalidResource(format!("stale buffer handle {:?}", dst)))?;
        let start = dst_offset as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|&end| end <= buffer.data.len())
            .ok_or_else(|| Error::InvalidArgument("buffer too small for the texture readback".to_string()))?;
        buffer.data[start..end].copy_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
#[path = "software_resources_tests.rs"]
mod tests;

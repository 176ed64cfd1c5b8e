/// Shader modules, pipeline layouts and native pipelines
///
/// A PSO owns its shader modules, its own copies of the descriptor set
/// layouts and one native pipeline per (render pass, subpass) it was used
/// with. Graphics PSOs created without an explicit render pass build their
/// pipelines lazily, on the first draw inside a compatible pass.

use ash::vk;
use std::ffi::CString;
use ten_rhi::rhi::device::{BlendAttachmentDesc, DescriptorSetLayoutDesc, GraphicsPipelineStateDesc};
use ten_rhi::rhi::{Error, Result};
use ten_rhi::{rhi_debug, rhi_warn};

use crate::vulkan_context::{vk_err, SOURCE};
use crate::vulkan_descriptor_set::{create_empty_layout, create_layout};
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, color_write_mask_to_vk, compare_op_to_vk, cull_mode_to_vk,
    front_face_to_vk, input_rate_to_vk, topology_to_vk, vertex_format_to_vk,
};
use crate::vulkan_resources::{ShaderStage, VulkanPso};

/// First word of every SPIR-V module
pub(crate) const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Size of the SPIR-V header in bytes
const SPIRV_HEADER_BYTES: usize = 20;

/// Check a SPIR-V blob and convert it to words
pub(crate) fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < SPIRV_HEADER_BYTES {
        return Err(Error::InvalidArgument(format!(
            "SPIR-V bytecode is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidArgument(format!(
            "SPIR-V bytecode length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(Error::InvalidArgument(format!("bad SPIR-V magic number {:#010x}", words[0])));
    }
    Ok(words)
}

/// What reflection found in one shader stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StageReflection {
    pub entry: String,
    /// (set, binding) pairs the entry point uses
    pub bindings: Vec<(u32, u32)>,
}

fn execution_model(stage: vk::ShaderStageFlags) -> spirq::spirv::ExecutionModel {
    if stage == vk::ShaderStageFlags::VERTEX {
        spirq::spirv::ExecutionModel::Vertex
    } else if stage == vk::ShaderStageFlags::FRAGMENT {
        spirq::spirv::ExecutionModel::Fragment
    } else {
        spirq::spirv::ExecutionModel::GLCompute
    }
}

/// Find the entry point of `stage`, falling back to `main` when reflection fails
pub(crate) fn reflect_stage(words: &[u32], stage: vk::ShaderStageFlags) -> StageReflection {
    let fallback = || StageReflection { entry: "main".to_string(), bindings: Vec::new() };
    let entry_points = match spirq::ReflectConfig::new().spv(words).ref_all_rscs(true).reflect() {
        Ok(entry_points) => entry_points,
        Err(e) => {
            rhi_warn!(SOURCE, "SPIR-V reflection failed ({:?}), assuming entry point 'main'", e);
            return fallback();
        }
    };
    let model = execution_model(stage);
    let Some(entry_point) = entry_points.iter().find(|ep| ep.exec_model == model) else {
        rhi_warn!(SOURCE, "No {:?} entry point found, assuming 'main'", model);
        return fallback();
    };
    let bindings = entry_point
        .vars
        .iter()
        .filter_map(|var| match var {
            spirq::var::Variable::Descriptor { desc_bind, .. } => Some((desc_bind.set(), desc_bind.bind())),
            _ => None,
        })
        .collect();
    StageReflection { entry: entry_point.name.clone(), bindings }
}

/// Bindings a shader uses that the PSO's layouts do not declare
pub(crate) fn undeclared_bindings(
    used: &[(u32, u32)],
    schemas: &[Option<DescriptorSetLayoutDesc>],
) -> Vec<(u32, u32)> {
    used.iter()
        .copied()
        .filter(|&(set, binding)| {
            let declared = schemas
                .get(set as usize)
                .and_then(|schema| schema.as_ref())
                .is_some_and(|schema| schema.find(binding).is_some());
            !declared
        })
        .collect()
}

/// Validate, reflect and load one shader stage
pub(crate) fn create_shader_stage(
    device: &ash::Device,
    bytes: &[u8],
    stage: vk::ShaderStageFlags,
    schemas: &[Option<DescriptorSetLayoutDesc>],
) -> Result<ShaderStage> {
    let words = spirv_words(bytes)?;
    let reflection = reflect_stage(&words, stage);
    for (set, binding) in undeclared_bindings(&reflection.bindings, schemas) {
        rhi_warn!(SOURCE, "{:?} shader uses set {} binding {}, which no layout declares", stage, set, binding);
    }
    let entry = CString::new(reflection.entry.replace('\0', "")).unwrap_or_default();

    let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
    let module = unsafe { device.create_shader_module(&create_info, None) }
        .map_err(|e| vk_err("Failed to create shader module", e))?;
    Ok(ShaderStage { module, stage, entry })
}

/// Native set layouts of a PSO: set 0, then set 1 when given
///
/// An empty placeholder stands at set 0 when only set 1 is declared. On
/// failure every layout created so far is destroyed.
pub(crate) fn create_set_layouts(
    device: &ash::Device,
    schemas: &[Option<DescriptorSetLayoutDesc>],
) -> Result<Vec<vk::DescriptorSetLayout>> {
    let mut layouts = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let created = match schema {
            Some(desc) => create_layout(device, desc),
            None => create_empty_layout(device),
        };
        match created {
            Ok(layout) => layouts.push(layout),
            Err(e) => {
                for layout in layouts {
                    unsafe { device.destroy_descriptor_set_layout(layout, None) };
                }
                return Err(e);
            }
        }
    }
    Ok(layouts)
}

/// Schemas per set index, trailing unused sets removed
pub(crate) fn set_schemas(
    first: Option<DescriptorSetLayoutDesc>,
    second: Option<DescriptorSetLayoutDesc>,
) -> Vec<Option<DescriptorSetLayoutDesc>> {
    match (first, second) {
        (first, Some(second)) => vec![first, Some(second)],
        (Some(first), None) => vec![Some(first)],
        (None, None) => Vec::new(),
    }
}

pub(crate) fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout> {
    let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    unsafe { device.create_pipeline_layout(&layout_create_info, None) }
        .map_err(|e| vk_err("Failed to create pipeline layout", e))
}

fn blend_attachment(desc: &BlendAttachmentDesc) -> vk::PipelineColorBlendAttachmentState {
    let mut attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(color_write_mask_to_vk(desc.color_write_mask))
        .blend_enable(desc.blend_enable);
    if desc.blend_enable {
        attachment = attachment
            .src_color_blend_factor(blend_factor_to_vk(desc.src_color_blend))
            .dst_color_blend_factor(blend_factor_to_vk(desc.dst_color_blend))
            .color_blend_op(blend_op_to_vk(desc.color_blend_op))
            .src_alpha_blend_factor(blend_factor_to_vk(desc.src_alpha_blend))
            .dst_alpha_blend_factor(blend_factor_to_vk(desc.dst_alpha_blend))
            .alpha_blend_op(blend_op_to_vk(desc.alpha_blend_op));
    }
    attachment
}

/// One blend state per color attachment of the subpass
///
/// Missing entries repeat the default state; extra entries are dropped.
pub(crate) fn blend_attachments(
    state: &GraphicsPipelineStateDesc,
    color_count: usize,
) -> Vec<vk::PipelineColorBlendAttachmentState> {
    (0..color_count)
        .map(|index| {
            let desc = state.blend_attachments.get(index).copied().unwrap_or_default();
            blend_attachment(&desc)
        })
        .collect()
}

/// Build the graphics pipeline of `pso` for one subpass
pub(crate) fn build_graphics_pipeline(
    device: &ash::Device,
    pso: &VulkanPso,
    render_pass: vk::RenderPass,
    subpass: u32,
    color_count: usize,
) -> Result<vk::Pipeline> {
    let Some(desc) = pso.graphics.as_ref() else {
        return Err(Error::InvalidResource("compute PSO has no graphics state".to_string()));
    };
    let state = desc.state_or_default();

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = pso
        .stages
        .iter()
        .map(|stage| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.stage)
                .module(stage.module)
                .name(&stage.entry)
        })
        .collect();

    // Vertex input state
    let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_layout
        .bindings
        .iter()
        .map(|binding| vk::VertexInputBindingDescription {
            binding: binding.binding,
            stride: binding.stride,
            input_rate: input_rate_to_vk(binding.input_rate),
        })
        .collect();

    let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: attribute.binding,
            format: vertex_format_to_vk(attribute.format),
            offset: attribute.offset,
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(desc.topology))
        .primitive_restart_enable(false);

    // Viewport state (dynamic)
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(cull_mode_to_vk(state.rasterization.cull_mode))
        .front_face(front_face_to_vk(state.rasterization.front_face))
        .depth_bias_enable(false);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(state.depth_stencil.depth_test_enable)
        .depth_write_enable(state.depth_stencil.depth_write_enable)
        .depth_compare_op(compare_op_to_vk(state.depth_stencil.depth_compare_op))
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = blend_attachments(&state, color_count);
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .depth_stencil_state(&depth_stencil_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(pso.layout)
        .render_pass(render_pass)
        .subpass(subpass);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
    }
    .map_err(|(_, e)| vk_err("Failed to create graphics pipeline", e))?;

    rhi_debug!(SOURCE, "Built graphics pipeline for subpass {} ({} color attachments)", subpass, color_count);
    Ok(pipelines[0])
}

pub(crate) fn build_compute_pipeline(device: &ash::Device, pso: &VulkanPso) -> Result<vk::Pipeline> {
    let Some(stage) = pso.stages.first() else {
        return Err(Error::InvalidResource("compute PSO has no shader stage".to_string()));
    };
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(stage.module)
        .name(&stage.entry);
    let pipeline_create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info)
        .layout(pso.layout);

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
    }
    .map_err(|(_, e)| vk_err("Failed to create compute pipeline", e))?;
    Ok(pipelines[0])
}

/// Destroy every native object of a PSO
pub(crate) fn destroy(device: &ash::Device, pso: VulkanPso) {
    unsafe {
        for (_, pipeline) in pso.pipelines {
            device.destroy_pipeline(pipeline, None);
        }
        device.destroy_pipeline_layout(pso.layout, None);
        for layout in pso.set_layouts {
            device.destroy_descriptor_set_layout(layout, None);
        }
        for stage in pso.stages {
            device.destroy_shader_module(stage.module, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_pipeline_tests.rs"]
mod tests;

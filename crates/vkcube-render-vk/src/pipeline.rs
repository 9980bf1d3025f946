// SPDX-License-Identifier: CEPL-1.0
//! Turns the backend-neutral prepare descriptions into Vulkan objects.
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use vkcube_render::preparer::{
    Access, AttachmentDesc, CompareOp, CullMode, DescriptorKind, DescriptorLayoutDesc,
    FrontFace, Layout, LoadOp, PipelineDesc, RenderPassDesc, ShaderStage, Stages, StoreOp,
};

pub(crate) fn stages(s: Stages) -> vk::PipelineStageFlags {
    let mut out = vk::PipelineStageFlags::empty();
    for (ours, theirs) in [
        (
            Stages::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (
            Stages::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        (
            Stages::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        (Stages::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
    ] {
        if s.contains(ours) {
            out |= theirs;
        }
    }
    out
}

pub(crate) fn access(a: Access) -> vk::AccessFlags {
    let mut out = vk::AccessFlags::empty();
    for (ours, theirs) in [
        (
            Access::COLOR_ATTACHMENT_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_READ,
        ),
        (
            Access::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ),
        (
            Access::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ),
        (
            Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
    ] {
        if a.contains(ours) {
            out |= theirs;
        }
    }
    out
}

pub(crate) fn layout(l: Layout) -> vk::ImageLayout {
    match l {
        Layout::Undefined => vk::ImageLayout::UNDEFINED,
        Layout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        Layout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        Layout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

fn cull_mode(c: CullMode) -> vk::CullModeFlags {
    match c {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

fn front_face(f: FrontFace) -> vk::FrontFace {
    match f {
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

fn compare_op(c: CompareOp) -> vk::CompareOp {
    match c {
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn descriptor_type(k: DescriptorKind) -> vk::DescriptorType {
    match k {
        DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

fn shader_stage(s: ShaderStage) -> vk::ShaderStageFlags {
    match s {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

fn attachment(desc: &AttachmentDesc, format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: load_op(desc.load),
        store_op: store_op(desc.store),
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: layout(desc.initial_layout),
        final_layout: layout(desc.final_layout),
        ..Default::default()
    }
}

/// Set layout plus the pipeline layout that uses it.
pub(crate) unsafe fn create_descriptor_layout(
    device: &ash::Device,
    desc: &DescriptorLayoutDesc,
) -> Result<(vk::DescriptorSetLayout, vk::PipelineLayout)> {
    let bindings: Vec<_> = desc
        .bindings
        .iter()
        .map(|b| vk::DescriptorSetLayoutBinding {
            binding: b.binding,
            descriptor_type: descriptor_type(b.kind),
            descriptor_count: b.count,
            stage_flags: shader_stage(b.stage),
            ..Default::default()
        })
        .collect();
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    let set_layout = device
        .create_descriptor_set_layout(&ci, None)
        .context("create_descriptor_set_layout")?;

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: 1,
        p_set_layouts: &set_layout,
        ..Default::default()
    };
    let pipeline_layout = device
        .create_pipeline_layout(&layout_info, None)
        .context("create_pipeline_layout")?;
    Ok((set_layout, pipeline_layout))
}

pub(crate) unsafe fn create_render_pass(
    device: &ash::Device,
    desc: &RenderPassDesc,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [
        attachment(&desc.color, color_format),
        attachment(&desc.depth, depth_format),
    ];
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: layout(desc.color.subpass_layout),
    };
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: layout(desc.depth.subpass_layout),
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        p_depth_stencil_attachment: &depth_ref,
        ..Default::default()
    };
    let dependencies = desc.dependencies.map(|d| vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages(d.src_stages),
        dst_stage_mask: stages(d.dst_stages),
        src_access_mask: access(d.src_access),
        dst_access_mask: access(d.dst_access),
        dependency_flags: vk::DependencyFlags::empty(),
    });

    let rp_info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: dependencies.len() as u32,
        p_dependencies: dependencies.as_ptr(),
        ..Default::default()
    };
    Ok(device
        .create_render_pass(&rp_info, None)
        .context("create_render_pass")?)
}

unsafe fn shader_module(device: &ash::Device, bytes: &[u8]) -> Result<vk::ShaderModule> {
    let code = read_spv(&mut Cursor::new(bytes)).context("read_spv")?;
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device.create_shader_module(&ci, None)?)
}

/// Pipeline cache plus the cube pipeline. Vertices come from the uniform
/// buffer, so there is no vertex input state.
pub(crate) unsafe fn create_pipeline(
    device: &ash::Device,
    desc: &PipelineDesc,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
) -> Result<(vk::PipelineCache, vk::Pipeline)> {
    let cache_ci = vk::PipelineCacheCreateInfo {
        s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
        ..Default::default()
    };
    let cache = device
        .create_pipeline_cache(&cache_ci, None)
        .context("create_pipeline_cache")?;

    let vs_bytes = include_bytes!(concat!(env!("OUT_DIR"), "/cube.vert.spv"));
    let fs_bytes: &[u8] = if desc.textured {
        include_bytes!(concat!(env!("OUT_DIR"), "/cube.frag.spv"))
    } else {
        include_bytes!(concat!(env!("OUT_DIR"), "/solid.frag.spv"))
    };
    let vs = shader_module(device, vs_bytes)?;
    let fs = shader_module(device, fs_bytes)?;
    let entry = c"main";

    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };
    let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: if desc.dynamic_viewport_scissor {
            dyn_states.len() as u32
        } else {
            0
        },
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: cull_mode(desc.cull_mode),
        front_face: front_face(desc.front_face),
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let keep = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: desc.depth_test.into(),
        depth_write_enable: desc.depth_write.into(),
        depth_compare_op: compare_op(desc.depth_compare),
        front: keep,
        back: keep,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: desc.blend.into(),
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        ..Default::default()
    };

    let created =
        device.create_graphics_pipelines(cache, std::slice::from_ref(&pipeline_info), None);
    device.destroy_shader_module(vs, None);
    device.destroy_shader_module(fs, None);
    let pipelines = created.map_err(|(_, err)| anyhow!("create_graphics_pipelines: {err:?}"))?;
    Ok((cache, pipelines[0]))
}

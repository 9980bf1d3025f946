// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use vkcube_render::recorder::{DrawPlan, OwnershipTransfer};

use crate::swapchain::color_range;

pub(crate) struct DrawTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set: vk::DescriptorSet,
    pub image: vk::Image,
}

/// Present-layout image changing queue family. Access masks stay empty; the
/// semaphore between the two submits carries the memory dependency.
fn ownership_barrier(image: vk::Image, transfer: &OwnershipTransfer) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::empty(),
        old_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        src_queue_family_index: transfer.src_family,
        dst_queue_family_index: transfer.dst_family,
        image,
        subresource_range: color_range(),
        ..Default::default()
    }
}

unsafe fn begin_reusable(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;
    Ok(())
}

// STRICT ORDER inside the render pass:
// bind pipeline -> bind set -> viewport -> scissor -> draw.
// The release barrier goes after the pass, once the image is in present layout.
pub(crate) unsafe fn record_draw(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    plan: &DrawPlan,
    t: &DrawTargets,
) -> Result<()> {
    begin_reusable(device, cmd)?;

    let clears = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: plan.clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: plan.clear_depth,
                stencil: plan.clear_stencil,
            },
        },
    ];
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: t.render_pass,
        framebuffer: t.framebuffer,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: plan.render_area.width,
                height: plan.render_area.height,
            },
        },
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, t.pipeline);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        t.layout,
        0,
        &[t.set],
        &[],
    );

    let vp = plan.viewport;
    device.cmd_set_viewport(
        cmd,
        0,
        &[vk::Viewport {
            x: vp.x,
            y: vp.y,
            width: vp.width,
            height: vp.height,
            min_depth: vp.min_depth,
            max_depth: vp.max_depth,
        }],
    );
    let sc = plan.scissor;
    device.cmd_set_scissor(
        cmd,
        0,
        &[vk::Rect2D {
            offset: vk::Offset2D { x: sc.x, y: sc.y },
            extent: vk::Extent2D {
                width: sc.width,
                height: sc.height,
            },
        }],
    );
    device.cmd_draw(cmd, plan.vertex_count, plan.instance_count, 0, 0);
    device.cmd_end_render_pass(cmd);

    if let Some(transfer) = &plan.ownership {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[ownership_barrier(t.image, transfer)],
        );
    }

    device
        .end_command_buffer(cmd)
        .context("end_command_buffer(draw)")?;
    Ok(())
}

/// Acquire half of the transfer, run on the present queue.
pub(crate) unsafe fn record_ownership_acquire(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    transfer: &OwnershipTransfer,
) -> Result<()> {
    begin_reusable(device, cmd)?;
    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[ownership_barrier(image, transfer)],
    );
    device
        .end_command_buffer(cmd)
        .context("end_command_buffer(ownership)")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_barrier_keeps_layout_and_moves_family() {
        let t = OwnershipTransfer {
            src_family: 1,
            dst_family: 0,
        };
        let b = ownership_barrier(vk::Image::null(), &t);
        assert_eq!(b.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(b.new_layout, b.old_layout);
        assert_eq!((b.src_queue_family_index, b.dst_queue_family_index), (1, 0));
        assert!(b.src_access_mask.is_empty() && b.dst_access_mask.is_empty());
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! Descriptions of the objects a prepare cycle builds, and the order it
//! builds them in. Backends translate the descriptions into API objects.
use anyhow::{Context, Result};
use bitflags::bitflags;
use tracing::debug;

use crate::config::StartupConfig;
use crate::context::{DeviceResources, GraphicsContext};
use crate::recorder::{DrawPlan, OwnershipTransfer};
use crate::session::FrameSession;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Stages: u32 {
        const COLOR_ATTACHMENT_OUTPUT = 1 << 0;
        const EARLY_FRAGMENT_TESTS = 1 << 1;
        const LATE_FRAGMENT_TESTS = 1 << 2;
        const BOTTOM_OF_PIPE = 1 << 3;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Access: u32 {
        const COLOR_ATTACHMENT_READ = 1 << 0;
        const COLOR_ATTACHMENT_WRITE = 1 << 1;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Undefined,
    ColorAttachment,
    DepthStencilAttachment,
    PresentSrc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_layout: Layout,
    pub final_layout: Layout,
    /// Layout inside the subpass.
    pub subpass_layout: Layout,
}

/// Dependency from outside the render pass into its only subpass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExternalDependency {
    pub src_stages: Stages,
    pub dst_stages: Stages,
    pub src_access: Access,
    pub dst_access: Access,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color: AttachmentDesc,
    pub depth: AttachmentDesc,
    pub dependencies: [ExternalDependency; 2],
}

impl RenderPassDesc {
    pub fn cube() -> Self {
        Self {
            color: AttachmentDesc {
                load: LoadOp::Clear,
                store: StoreOp::Store,
                initial_layout: Layout::Undefined,
                final_layout: Layout::PresentSrc,
                subpass_layout: Layout::ColorAttachment,
            },
            depth: AttachmentDesc {
                load: LoadOp::Clear,
                store: StoreOp::DontCare,
                initial_layout: Layout::Undefined,
                final_layout: Layout::DepthStencilAttachment,
                subpass_layout: Layout::DepthStencilAttachment,
            },
            dependencies: [
                // Last frame's depth writes finish before this frame clears.
                ExternalDependency {
                    src_stages: Stages::EARLY_FRAGMENT_TESTS | Stages::LATE_FRAGMENT_TESTS,
                    dst_stages: Stages::EARLY_FRAGMENT_TESTS | Stages::LATE_FRAGMENT_TESTS,
                    src_access: Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    dst_access: Access::DEPTH_STENCIL_ATTACHMENT_READ
                        | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
                },
                // Layout transition waits for the acquire semaphore's stage.
                ExternalDependency {
                    src_stages: Stages::COLOR_ATTACHMENT_OUTPUT,
                    dst_stages: Stages::COLOR_ATTACHMENT_OUTPUT,
                    src_access: Access::empty(),
                    dst_access: Access::COLOR_ATTACHMENT_WRITE | Access::COLOR_ATTACHMENT_READ,
                },
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub blend: bool,
    pub dynamic_viewport_scissor: bool,
    /// Selects the textured fragment shader.
    pub textured: bool,
}

impl PipelineDesc {
    pub fn cube(textured: bool) -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::LessOrEqual,
            blend: false,
            dynamic_viewport_scissor: true,
            textured,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    CombinedImageSampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub stage: ShaderStage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorLayoutDesc {
    pub bindings: Vec<Binding>,
}

impl DescriptorLayoutDesc {
    pub fn cube(textured: bool) -> Self {
        let mut bindings = vec![Binding {
            binding: 0,
            kind: DescriptorKind::UniformBuffer,
            count: 1,
            stage: ShaderStage::Vertex,
        }];
        if textured {
            bindings.push(Binding {
                binding: 1,
                kind: DescriptorKind::CombinedImageSampler,
                count: 1,
                stage: ShaderStage::Fragment,
            });
        }
        Self { bindings }
    }

    /// Pool sizing for one set per swapchain image.
    pub fn pool_sizes(&self, image_count: u32) -> Vec<(DescriptorKind, u32)> {
        self.bindings
            .iter()
            .map(|b| (b.kind, b.count * image_count))
            .collect()
    }
}

/// Build every prepare-scoped object and pre-record each image's commands.
/// The swapchain itself already exists.
pub(crate) fn build_resources<C>(
    ctx: &mut C,
    config: &StartupConfig,
    session: &mut FrameSession,
) -> Result<()>
where
    C: GraphicsContext + DeviceResources,
{
    ctx.dispatch_load_assets().context("load assets")?;
    ctx.create_uniform_buffers(&session.scene().initial_uniform())
        .context("create uniform buffers")?;

    let layout = DescriptorLayoutDesc::cube(config.textured);
    ctx.create_descriptor_layout(&layout)
        .context("create descriptor layout")?;
    ctx.create_render_pass(&RenderPassDesc::cube())
        .context("create render pass")?;
    ctx.create_pipeline(&PipelineDesc::cube(config.textured))
        .context("create pipeline")?;

    let families = ctx.queue_families();
    let image_count = ctx.image_count();
    if let Some(transfer) = OwnershipTransfer::between(families) {
        ctx.create_present_commands()
            .context("create present command pool")?;
        for image in 0..image_count {
            ctx.record_ownership_transfer(image, &transfer)?;
        }
    }

    ctx.create_descriptor_sets(&layout)
        .context("create descriptor sets")?;
    ctx.create_framebuffers().context("create framebuffers")?;

    let size = ctx.surface_size();
    for image in 0..image_count {
        session.current_buffer = image;
        let plan = DrawPlan::for_image(image, size, families, config.clear_color);
        ctx.record_draw(&plan)
            .with_context(|| format!("record draw commands for image {image}"))?;
    }

    ctx.flush_init_commands().context("flush init commands")?;
    debug!(image_count, separate = families.separate(), "prepared resources");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_presented_and_depth_discarded() {
        let rp = RenderPassDesc::cube();
        assert_eq!((rp.color.load, rp.color.store), (LoadOp::Clear, StoreOp::Store));
        assert_eq!(rp.color.final_layout, Layout::PresentSrc);
        assert_eq!((rp.depth.load, rp.depth.store), (LoadOp::Clear, StoreOp::DontCare));
    }

    #[test]
    fn dependencies_cover_depth_and_color() {
        let [depth, color] = RenderPassDesc::cube().dependencies;
        assert!(depth.src_access.contains(Access::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(depth.dst_stages.contains(Stages::LATE_FRAGMENT_TESTS));
        assert!(color.src_access.is_empty());
        assert_eq!(color.dst_stages, Stages::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn pipeline_culls_back_faces_and_tests_depth() {
        let p = PipelineDesc::cube(true);
        assert_eq!(p.cull_mode, CullMode::Back);
        assert_eq!(p.front_face, FrontFace::CounterClockwise);
        assert!(p.depth_test && p.depth_write);
        assert_eq!(p.depth_compare, CompareOp::LessOrEqual);
        assert!(!p.blend);
        assert!(p.dynamic_viewport_scissor);
    }

    #[test]
    fn sampler_binding_only_when_textured() {
        let textured = DescriptorLayoutDesc::cube(true);
        assert_eq!(textured.bindings.len(), 2);
        assert_eq!(textured.bindings[1].stage, ShaderStage::Fragment);
        assert_eq!(
            textured.pool_sizes(3),
            vec![
                (DescriptorKind::UniformBuffer, 3),
                (DescriptorKind::CombinedImageSampler, 3)
            ]
        );
        let plain = DescriptorLayoutDesc::cube(false);
        assert_eq!(plain.pool_sizes(2), vec![(DescriptorKind::UniformBuffer, 2)]);
    }
}

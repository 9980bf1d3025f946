// SPDX-License-Identifier: CEPL-1.0
//! What goes into each swapchain image's command buffer. Plans are computed
//! here and turned into commands by the backend once per image at prepare.
use crate::context::QueueFamilies;
use crate::RenderSize;
use vkcube_math::CUBE_VERTEX_COUNT;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Changed-region hint for incremental present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub layer: u32,
}

/// Queue-family release from graphics to present. Access masks stay empty
/// and the image stays in present-source layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub src_family: u32,
    pub dst_family: u32,
}

impl OwnershipTransfer {
    pub fn between(families: QueueFamilies) -> Option<Self> {
        families.separate().then_some(Self {
            src_family: families.graphics,
            dst_family: families.present,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawPlan {
    pub image: u32,
    pub render_area: RenderSize,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub viewport: Viewport,
    pub scissor: ScissorRect,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub ownership: Option<OwnershipTransfer>,
}

impl DrawPlan {
    pub fn for_image(
        image: u32,
        size: RenderSize,
        families: QueueFamilies,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            image,
            render_area: size,
            clear_color,
            clear_depth: 1.0,
            clear_stencil: 0,
            viewport: centered_viewport(size),
            scissor: ScissorRect {
                x: 0,
                y: 0,
                width: size.width,
                height: size.height,
            },
            vertex_count: CUBE_VERTEX_COUNT as u32,
            instance_count: 1,
            ownership: OwnershipTransfer::between(families),
        }
    }
}

/// Largest square that fits the surface, centered on the longer axis.
pub fn centered_viewport(size: RenderSize) -> Viewport {
    let (w, h) = (size.width as f32, size.height as f32);
    let (x, y, side) = if size.width < size.height {
        (0.0, (h - w) / 2.0, w)
    } else {
        ((w - h) / 2.0, 0.0, h)
    };
    Viewport {
        x,
        y,
        width: side,
        height: side,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Everything except a border of one eighth of each dimension.
pub fn damage_rect(size: RenderSize) -> DamageRect {
    let eighth_w = size.width / 8;
    let eighth_h = size.height / 8;
    DamageRect {
        x: eighth_w as i32,
        y: eighth_h as i32,
        width: eighth_w * 6,
        height: eighth_h * 6,
        layer: 0,
    }
}

// SPDX-License-Identifier: CEPL-1.0
use anyhow::anyhow;
use ash::vk;
use vkcube_render::recorder::DamageRect;
use vkcube_render::timing::{PastPresentationTiming, PresentTime};
use vkcube_render::{SwapchainError, SwapchainStatus};

/// Sort an acquire/present failure into the three recoverable cases or fatal.
pub(crate) fn swapchain_error(err: vk::Result, call: &'static str) -> SwapchainError {
    match err {
        vk::Result::ERROR_OUT_OF_DATE_KHR => SwapchainError::OutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => SwapchainError::SurfaceLost,
        other => SwapchainError::Fatal(anyhow!("{call}: {other:?}")),
    }
}

pub(crate) fn status(suboptimal: bool) -> SwapchainStatus {
    if suboptimal {
        SwapchainStatus::Suboptimal
    } else {
        SwapchainStatus::Optimal
    }
}

pub(crate) fn rect_layer(d: &DamageRect) -> vk::RectLayerKHR {
    vk::RectLayerKHR {
        offset: vk::Offset2D { x: d.x, y: d.y },
        extent: vk::Extent2D {
            width: d.width,
            height: d.height,
        },
        layer: d.layer,
    }
}

pub(crate) fn present_time(t: &PresentTime) -> vk::PresentTimeGOOGLE {
    vk::PresentTimeGOOGLE {
        present_id: t.present_id,
        desired_present_time: t.desired_present_time,
    }
}

pub(crate) fn past_timing(t: &vk::PastPresentationTimingGOOGLE) -> PastPresentationTiming {
    PastPresentationTiming {
        present_id: t.present_id,
        desired_present_time: t.desired_present_time,
        actual_present_time: t.actual_present_time,
        earliest_present_time: t.earliest_present_time,
        present_margin: t.present_margin,
    }
}

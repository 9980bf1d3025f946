// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use tracing::info;
use vkcube_render::{PresentModePref, RenderSize};

use crate::memory;

pub(crate) struct SwapchainBundle {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl SwapchainBundle {
    pub(crate) fn size(&self) -> RenderSize {
        RenderSize {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub(crate) unsafe fn destroy(self, device: &ash::Device, swap_d: &swapchain::Device) {
        for &iv in &self.views {
            device.destroy_image_view(iv, None);
        }
        swap_d.destroy_swapchain(self.swapchain, None);
    }
}

#[derive(Default)]
pub(crate) struct DepthResources {
    pub format: vk::Format,
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl DepthResources {
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.image == vk::Image::null() {
            return;
        }
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
        *self = Self::default();
    }
}

pub(crate) fn present_mode_for(pref: PresentModePref) -> vk::PresentModeKHR {
    match pref {
        PresentModePref::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePref::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePref::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModePref::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

/// The preferred mode when offered, else FIFO, which every surface supports.
pub(crate) fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePref,
) -> vk::PresentModeKHR {
    let want = present_mode_for(pref);
    if modes.contains(&want) {
        want
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// 8-bit UNORM BGRA or RGBA when offered, else whatever comes first.
pub(crate) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            matches!(
                f.format,
                vk::Format::B8G8R8A8_UNORM | vk::Format::R8G8B8A8_UNORM
            )
        })
        .or_else(|| formats.first().copied())
}

/// The surface's extent, or the window size clamped to the allowed range
/// when the surface leaves it up to the swapchain.
pub(crate) fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Three images when allowed (0 means no upper bound).
pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count.max(3);
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

pub(crate) fn composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&a| supported.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub(crate) unsafe fn surface_extent(
    surf_i: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    want: RenderSize,
) -> Result<vk::Extent2D> {
    let caps = surf_i
        .get_physical_device_surface_capabilities(phys, surface)
        .context("get_physical_device_surface_capabilities")?;
    Ok(extent_from_caps(&caps, want))
}

/// New swapchain for `extent`, handing `old_swapchain` over for reuse. The
/// caller destroys the old one afterwards.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn create_swapchain(
    device: &ash::Device,
    surf_i: &surface::Instance,
    swap_d: &swapchain::Device,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    old_swapchain: vk::SwapchainKHR,
    extent: vk::Extent2D,
    pref: PresentModePref,
) -> Result<SwapchainBundle> {
    let caps = surf_i.get_physical_device_surface_capabilities(phys, surface)?;
    let formats = surf_i.get_physical_device_surface_formats(phys, surface)?;
    let modes = surf_i.get_physical_device_surface_present_modes(phys, surface)?;

    let surf_format =
        choose_surface_format(&formats).ok_or_else(|| anyhow!("surface reports no formats"))?;
    let present_mode = choose_present_mode(&modes, pref);
    let min_count = image_count(&caps);

    let pre_transform = if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    };

    let swap_info = vk::SwapchainCreateInfoKHR {
        s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        surface,
        min_image_count: min_count,
        image_format: surf_format.format,
        image_color_space: surf_format.color_space,
        image_extent: extent,
        image_array_layers: 1,
        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
        pre_transform,
        composite_alpha: composite_alpha(caps.supported_composite_alpha),
        present_mode,
        clipped: vk::TRUE,
        old_swapchain,
        ..Default::default()
    };
    let new_swapchain = swap_d
        .create_swapchain(&swap_info, None)
        .context("create_swapchain")?;
    let images = swap_d.get_swapchain_images(new_swapchain)?;

    let mut views = Vec::with_capacity(images.len());
    for &img in &images {
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: img,
            view_type: vk::ImageViewType::TYPE_2D,
            format: surf_format.format,
            subresource_range: color_range(),
            ..Default::default()
        };
        views.push(device.create_image_view(&iv_info, None)?);
    }

    info!(
        "swapchain {}x{}, {} images, format {:?}, present mode {:?}",
        extent.width,
        extent.height,
        images.len(),
        surf_format.format,
        present_mode
    );

    Ok(SwapchainBundle {
        swapchain: new_swapchain,
        format: surf_format,
        extent,
        images,
        views,
    })
}

pub(crate) fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub(crate) unsafe fn pick_depth_format(instance: &Instance, phys: vk::PhysicalDevice) -> vk::Format {
    let candidates = [
        vk::Format::D16_UNORM,
        vk::Format::D32_SFLOAT,
        vk::Format::D24_UNORM_S8_UINT,
    ];
    for &fmt in &candidates {
        let props = instance.get_physical_device_format_properties(phys, fmt);
        if props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return fmt;
        }
    }
    vk::Format::D16_UNORM
}

pub(crate) unsafe fn create_depth(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    format: vk::Format,
    extent: vk::Extent2D,
) -> Result<DepthResources> {
    let img_ci = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = device
        .create_image(&img_ci, None)
        .context("create_image(depth)")?;
    let memory =
        memory::bind_image_memory(device, mem_props, image, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            ..color_range()
        },
        ..Default::default()
    };
    let view = device.create_image_view(&view_ci, None)?;
    Ok(DepthResources {
        format,
        image,
        memory,
        view,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn unsupported_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, PresentModePref::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&modes, PresentModePref::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn fixed_extent_wins_over_window_size() {
        let want = RenderSize {
            width: 500,
            height: 500,
        };
        let e = extent_from_caps(&caps((800, 600), 2, 0), want);
        assert_eq!((e.width, e.height), (800, 600));
        let e = extent_from_caps(&caps((u32::MAX, u32::MAX), 2, 0), want);
        assert_eq!((e.width, e.height), (500, 500));
        let huge = RenderSize {
            width: 9000,
            height: 1,
        };
        let e = extent_from_caps(&caps((u32::MAX, u32::MAX), 2, 0), huge);
        assert_eq!((e.width, e.height), (4096, 16));
    }

    #[test]
    fn image_count_respects_limits() {
        assert_eq!(image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(image_count(&caps((1, 1), 2, 2)), 2);
        assert_eq!(image_count(&caps((1, 1), 4, 8)), 4);
    }

    #[test]
    fn unorm_format_preferred() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            ..srgb
        };
        let pick = |f: &[vk::SurfaceFormatKHR]| choose_surface_format(f).map(|f| f.format);
        assert_eq!(pick(&[srgb, unorm]), Some(vk::Format::R8G8B8A8_UNORM));
        assert_eq!(pick(&[srgb]), Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(pick(&[]), None);
    }

    #[test]
    fn opaque_alpha_first() {
        let all = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(composite_alpha(all), vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(
            composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }
}

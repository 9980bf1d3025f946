// SPDX-License-Identifier: CEPL-1.0
//! Procedural checker texture, uploaded either through a staging buffer into
//! an optimally tiled image or written straight into a linear one.
use anyhow::{Context, Result};
use ash::{vk, Instance};
use tracing::{debug, info};

use crate::memory;
use crate::swapchain::color_range;

pub(crate) const TEX_SIZE: u32 = 256;
const TEX_CELLS: u32 = 8;
const TEX_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const LIGHT: [u8; 4] = [0xe6, 0xe0, 0xd0, 0xff];
const DARK: [u8; 4] = [0x3a, 0x5a, 0x8c, 0xff];

/// Tightly packed RGBA8 rows, `cells` squares per side.
pub(crate) fn checker_pixels(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut out = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let texel = if ((x / cell) + (y / cell)) % 2 == 0 {
                LIGHT
            } else {
                DARK
            };
            out.extend_from_slice(&texel);
        }
    }
    out
}

#[derive(Default)]
pub(crate) struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    /// Source of the pending copy; freed once the init commands complete.
    pub staging: Option<(vk::Buffer, vk::DeviceMemory)>,
}

impl Texture {
    pub(crate) unsafe fn free_staging(&mut self, device: &ash::Device) {
        if let Some((buf, mem)) = self.staging.take() {
            device.destroy_buffer(buf, None);
            device.free_memory(mem, None);
        }
    }

    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        self.free_staging(device);
        if self.image == vk::Image::null() {
            return;
        }
        device.destroy_sampler(self.sampler, None);
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
        *self = Self::default();
    }
}

unsafe fn create_image(
    device: &ash::Device,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    initial_layout: vk::ImageLayout,
) -> Result<vk::Image> {
    let ci = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format: TEX_FORMAT,
        extent: vk::Extent3D {
            width: TEX_SIZE,
            height: TEX_SIZE,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout,
        ..Default::default()
    };
    Ok(device.create_image(&ci, None).context("create_image(texture)")?)
}

unsafe fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    (old_layout, src_access): (vk::ImageLayout, vk::AccessFlags),
    (new_layout, dst_access): (vk::ImageLayout, vk::AccessFlags),
    src_stage: vk::PipelineStageFlags,
) {
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: color_range(),
        ..Default::default()
    };
    let dst_stage = if new_layout == vk::ImageLayout::TRANSFER_DST_OPTIMAL {
        vk::PipelineStageFlags::TRANSFER
    } else {
        vk::PipelineStageFlags::FRAGMENT_SHADER
    };
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Host-visible linear image written row by row at the driver's pitch.
unsafe fn load_linear(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    cmd: vk::CommandBuffer,
    pixels: &[u8],
) -> Result<Texture> {
    let image = create_image(
        device,
        vk::ImageTiling::LINEAR,
        vk::ImageUsageFlags::SAMPLED,
        vk::ImageLayout::PREINITIALIZED,
    )?;
    let memory = memory::bind_image_memory(
        device,
        mem_props,
        image,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let layout = device.get_image_subresource_layout(
        image,
        vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        },
    );
    let ptr = device
        .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
        .context("map_memory(texture)")?
        .cast::<u8>();
    let row = (TEX_SIZE * 4) as usize;
    for (y, src) in pixels.chunks_exact(row).enumerate() {
        let dst = ptr.add(layout.offset as usize + y * layout.row_pitch as usize);
        std::ptr::copy_nonoverlapping(src.as_ptr(), dst, row);
    }
    device.unmap_memory(memory);

    transition(
        device,
        cmd,
        image,
        (vk::ImageLayout::PREINITIALIZED, vk::AccessFlags::HOST_WRITE),
        (
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::SHADER_READ,
        ),
        vk::PipelineStageFlags::HOST,
    );

    Ok(Texture {
        image,
        memory,
        ..Default::default()
    })
}

/// Staging buffer copied into a device-local optimal image by `cmd`.
unsafe fn load_staged(
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    cmd: vk::CommandBuffer,
    pixels: &[u8],
) -> Result<Texture> {
    let size = pixels.len() as vk::DeviceSize;
    let (staging, staging_mem) = memory::create_buffer_and_memory(
        device,
        mem_props,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let ptr = device
        .map_memory(staging_mem, 0, size, vk::MemoryMapFlags::empty())
        .context("map_memory(staging)")?;
    std::ptr::copy_nonoverlapping(pixels.as_ptr(), ptr.cast::<u8>(), pixels.len());
    device.unmap_memory(staging_mem);

    let image = create_image(
        device,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        vk::ImageLayout::UNDEFINED,
    )?;
    let memory =
        memory::bind_image_memory(device, mem_props, image, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

    transition(
        device,
        cmd,
        image,
        (vk::ImageLayout::UNDEFINED, vk::AccessFlags::empty()),
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        vk::PipelineStageFlags::TOP_OF_PIPE,
    );
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: TEX_SIZE,
            height: TEX_SIZE,
            depth: 1,
        },
    };
    device.cmd_copy_buffer_to_image(
        cmd,
        staging,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );
    transition(
        device,
        cmd,
        image,
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::SHADER_READ,
        ),
        vk::PipelineStageFlags::TRANSFER,
    );

    Ok(Texture {
        image,
        memory,
        staging: Some((staging, staging_mem)),
        ..Default::default()
    })
}

/// Records the upload into `cmd`; the image is readable once `cmd` has run.
/// Linear tiling is used unless `use_staging` is set or the format cannot be
/// sampled linearly.
pub(crate) unsafe fn load(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    device: &ash::Device,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    cmd: vk::CommandBuffer,
    use_staging: bool,
) -> Result<Texture> {
    let pixels = checker_pixels(TEX_SIZE, TEX_CELLS);
    let props = instance.get_physical_device_format_properties(phys, TEX_FORMAT);
    let linear_ok = props
        .linear_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE);

    let mut tex = if !use_staging && linear_ok {
        debug!("texture: linear upload");
        load_linear(device, mem_props, cmd, &pixels)?
    } else {
        debug!(use_staging, "texture: staged upload");
        load_staged(device, mem_props, cmd, &pixels)?
    };

    let sampler_ci = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::NEAREST,
        min_filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        max_anisotropy: 1.0,
        compare_op: vk::CompareOp::NEVER,
        border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
        ..Default::default()
    };
    tex.sampler = device
        .create_sampler(&sampler_ci, None)
        .context("create_sampler")?;
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image: tex.image,
        view_type: vk::ImageViewType::TYPE_2D,
        format: TEX_FORMAT,
        subresource_range: color_range(),
        ..Default::default()
    };
    tex.view = device
        .create_image_view(&view_ci, None)
        .context("create_image_view(texture)")?;

    info!("checker texture {TEX_SIZE}x{TEX_SIZE} loaded");
    Ok(tex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(px: &[u8], size: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * size + x) * 4) as usize;
        [px[i], px[i + 1], px[i + 2], px[i + 3]]
    }

    #[test]
    fn checker_alternates_by_cell() {
        let px = checker_pixels(16, 4);
        assert_eq!(px.len(), 16 * 16 * 4);
        assert_eq!(texel(&px, 16, 0, 0), LIGHT);
        assert_eq!(texel(&px, 16, 3, 3), LIGHT);
        assert_eq!(texel(&px, 16, 4, 0), DARK);
        assert_eq!(texel(&px, 16, 0, 4), DARK);
        assert_eq!(texel(&px, 16, 4, 4), LIGHT);
    }

    #[test]
    fn checker_is_opaque() {
        let px = checker_pixels(TEX_SIZE, TEX_CELLS);
        assert!(px.chunks_exact(4).all(|t| t[3] == 0xff));
    }
}

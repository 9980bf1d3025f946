// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr};

use anyhow::{anyhow, bail, Context, Result};
use ash::khr::{incremental_present, surface, swapchain};
use ash::{ext, google, vk, Entry, Instance};
use tracing::{info, warn};
use vkcube_render::{QueueFamilies, StartupConfig};

/// Optional device extensions that were requested and turned on.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EnabledExtensions {
    pub incremental_present: bool,
    pub display_timing: bool,
    pub calibrated_timestamps: bool,
}

/// Lower is better. Unknown types go last.
fn device_rank(ty: vk::PhysicalDeviceType) -> u32 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// A family doing both graphics and present wins. Otherwise the first
/// graphics family and the first present family, if both exist.
fn pick_families(families: &[(vk::QueueFlags, bool)]) -> Option<QueueFamilies> {
    let graphics = |f: &vk::QueueFlags| f.contains(vk::QueueFlags::GRAPHICS);
    if let Some(i) = families.iter().position(|(f, p)| graphics(f) && *p) {
        return Some(QueueFamilies::shared(i as u32));
    }
    let g = families.iter().position(|(f, _)| graphics(f))?;
    let p = families.iter().position(|&(_, p)| p)?;
    Some(QueueFamilies {
        graphics: g as u32,
        present: p as u32,
    })
}

unsafe fn device_name(instance: &Instance, phys: vk::PhysicalDevice) -> String {
    let props = instance.get_physical_device_properties(phys);
    CStr::from_ptr(props.device_name.as_ptr())
        .to_string_lossy()
        .into_owned()
}

unsafe fn families_for(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Result<Option<QueueFamilies>> {
    let qprops = instance.get_physical_device_queue_family_properties(phys);
    let mut caps = Vec::with_capacity(qprops.len());
    for (i, q) in qprops.iter().enumerate() {
        let present = surf_i
            .get_physical_device_surface_support(phys, i as u32, surface)
            .context("get_physical_device_surface_support")?;
        caps.push((q.queue_flags, present));
    }
    Ok(pick_families(&caps))
}

/// Physical device by explicit index, or the best-ranked one that can draw
/// to `surface`.
pub(crate) unsafe fn select_physical_device(
    instance: &Instance,
    surf_i: &surface::Instance,
    surface: vk::SurfaceKHR,
    gpu_number: Option<usize>,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let physical = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;
    if physical.is_empty() {
        bail!("no Vulkan physical devices found");
    }

    if let Some(n) = gpu_number {
        let phys = *physical.get(n).ok_or_else(|| {
            anyhow!(
                "--gpu_number {n} is out of range, {} device(s) available",
                physical.len()
            )
        })?;
        let families = families_for(instance, surf_i, surface, phys)?
            .ok_or_else(|| anyhow!("GPU {n} cannot draw to this surface"))?;
        info!(gpu = n, name = %device_name(instance, phys), "selected GPU by index");
        return Ok((phys, families));
    }

    let mut ranked: Vec<_> = physical
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let ty = instance.get_physical_device_properties(p).device_type;
            (device_rank(ty), i, p)
        })
        .collect();
    ranked.sort_unstable_by_key(|&(rank, i, _)| (rank, i));

    for (_, i, phys) in ranked {
        if let Some(families) = families_for(instance, surf_i, surface, phys)? {
            info!(gpu = i, name = %device_name(instance, phys), ?families, "selected GPU");
            return Ok((phys, families));
        }
    }
    Err(anyhow!("no physical device has graphics and present queues"))
}

unsafe fn supports_monotonic_clock(entry: &Entry, instance: &Instance, phys: vk::PhysicalDevice) -> bool {
    let loader = ext::calibrated_timestamps::Instance::new(entry, instance);
    loader
        .get_physical_device_calibrateable_time_domains(phys)
        .map(|domains| domains.contains(&vk::TimeDomainEXT::CLOCK_MONOTONIC))
        .unwrap_or(false)
}

/// Logical device with one queue per distinct family. Optional extensions
/// are enabled only when both requested and supported.
pub(crate) unsafe fn create_device(
    entry: &Entry,
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
    config: &StartupConfig,
) -> Result<(ash::Device, EnabledExtensions)> {
    let ext_props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let has = |name: &CStr| -> bool {
        ext_props
            .iter()
            .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
    };
    if !has(swapchain::NAME) {
        bail!("device lacks VK_KHR_swapchain");
    }

    let mut device_exts: Vec<*const c_char> = vec![swapchain::NAME.as_ptr()];
    let mut enabled = EnabledExtensions::default();

    if config.incremental_present {
        if has(incremental_present::NAME) {
            device_exts.push(incremental_present::NAME.as_ptr());
            enabled.incremental_present = true;
        } else {
            warn!("VK_KHR_incremental_present not supported, presenting full frames");
        }
    }
    if config.display_timing {
        if has(google::display_timing::NAME) {
            device_exts.push(google::display_timing::NAME.as_ptr());
            enabled.display_timing = true;
            if has(ext::calibrated_timestamps::NAME)
                && supports_monotonic_clock(entry, instance, phys)
            {
                device_exts.push(ext::calibrated_timestamps::NAME.as_ptr());
                enabled.calibrated_timestamps = true;
            }
        } else {
            warn!("VK_GOOGLE_display_timing not supported, presenting untimed");
        }
    }

    let priorities = [1.0_f32];
    let mut qinfos = vec![vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: families.graphics,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    }];
    if families.separate() {
        qinfos.push(vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: families.present,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        });
    }

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: qinfos.len() as u32,
        p_queue_create_infos: qinfos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };
    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;
    info!(?enabled, "device created");
    Ok((device, enabled))
}

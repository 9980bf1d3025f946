// SPDX-License-Identifier: CEPL-1.0
//! `ash` backend for the cube renderer: owns instance, surface, device,
//! swapchain and the FRAME_LAG sync set, and builds whatever a prepare cycle
//! asks for.
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ash::khr::surface;
use ash::{ext, google, khr, vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};
use vkcube_math::CubeUniform;
use vkcube_platform::PlatformWindow;
use vkcube_render::preparer::{DescriptorLayoutDesc, PipelineDesc, RenderPassDesc};
use vkcube_render::recorder::{DrawPlan, OwnershipTransfer};
use vkcube_render::timing::PastPresentationTiming;
use vkcube_render::{
    ContextFeatures, DeviceResources, GraphicsContext, PresentRequest, PresentWait,
    QueueFamilies, RenderSize, StartupConfig, SwapchainError, SwapchainStatus, FRAME_LAG,
};

mod device;
mod instance;
mod memory;
mod pipeline;
mod present;
mod record;
mod swapchain;
mod sync;
mod texture;

use instance::DebugMessenger;
use swapchain::{DepthResources, SwapchainBundle};
use sync::FrameSync;
use texture::Texture;

struct UniformBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
}

/// Everything one prepare cycle creates. Dropped as a unit by
/// `release_resources`.
#[derive(Default)]
struct Prepared {
    depth: DepthResources,
    cmd_pool: vk::CommandPool,
    draw_cmds: Vec<vk::CommandBuffer>,
    init_cmd: vk::CommandBuffer,
    texture: Texture,
    uniforms: Vec<UniformBuffer>,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    pipeline_cache: vk::PipelineCache,
    pipeline: vk::Pipeline,
    present_pool: vk::CommandPool,
    present_cmds: Vec<vk::CommandBuffer>,
    desc_pool: vk::DescriptorPool,
    desc_sets: Vec<vk::DescriptorSet>,
    framebuffers: Vec<vk::Framebuffer>,
}

pub struct VkContext {
    config: StartupConfig,
    window: Arc<dyn PlatformWindow>,
    display_raw: RawDisplayHandle,
    window_raw: RawWindowHandle,

    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    /// Replaced by `create_surface`; destroyed with the swapchain built on it.
    stale_surface: Option<vk::SurfaceKHR>,

    phys: vk::PhysicalDevice,
    mem_props: vk::PhysicalDeviceMemoryProperties,
    depth_format: vk::Format,
    device: ash::Device,
    families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    features: ContextFeatures,

    swapchain_loader: khr::swapchain::Device,
    display_timing: Option<google::display_timing::Device>,
    calibrated: Option<ext::calibrated_timestamps::Device>,

    swapchain: Option<SwapchainBundle>,
    frames: Option<FrameSync>,
    frame_index: usize,
    res: Prepared,

    window_size: RenderSize,
    minimized: bool,
    destroyed: bool,
}

impl VkContext {
    /// STRICT ORDER:
    /// 1) instance (WSI + optional validation) and debug messenger
    /// 2) surface FROM THIS INSTANCE
    /// 3) physical device + queue families checked AGAINST THIS SURFACE
    /// 4) device with the optional extensions that are both wanted and present
    /// 5) FRAME_LAG fences/semaphores
    /// No swapchain yet; the first prepare creates it.
    pub fn new(window: Arc<dyn PlatformWindow>, config: &StartupConfig) -> Result<Self> {
        unsafe {
            let display_raw = window
                .display_handle()
                .map_err(|e| anyhow!("{e}"))?
                .as_raw();
            let window_raw = window
                .window_handle()
                .map_err(|e| anyhow!("{e}"))?
                .as_raw();

            let entry = Entry::linked();
            let instance = instance::create_instance(
                &entry,
                display_raw,
                config.validate,
                config.validate_checks_disabled,
            )?;
            let debug = if config.validate {
                Some(instance::create_debug_messenger(
                    &entry,
                    &instance,
                    config.use_break,
                )?)
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            let surface =
                ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
                    .context("ash_window::create_surface")?;

            let (phys, families) = device::select_physical_device(
                &instance,
                &surface_loader,
                surface,
                config.gpu_number,
            )?;
            let (device, enabled) =
                device::create_device(&entry, &instance, phys, families, config)?;
            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);

            let swapchain_loader = khr::swapchain::Device::new(&instance, &device);
            let display_timing = enabled
                .display_timing
                .then(|| google::display_timing::Device::new(&instance, &device));
            let calibrated = enabled
                .calibrated_timestamps
                .then(|| ext::calibrated_timestamps::Device::new(&instance, &device));
            if enabled.display_timing && calibrated.is_none() {
                warn!("no CLOCK_MONOTONIC calibration, first present goes out untimed");
            }

            let frames = FrameSync::new(&device, families.separate())?;
            let mem_props = instance.get_physical_device_memory_properties(phys);
            let depth_format = swapchain::pick_depth_format(&instance, phys);

            Ok(Self {
                config: config.clone(),
                window,
                display_raw,
                window_raw,
                entry,
                instance,
                debug,
                surface_loader,
                surface,
                stale_surface: None,
                phys,
                mem_props,
                depth_format,
                device,
                families,
                graphics_queue,
                present_queue,
                features: ContextFeatures {
                    display_timing: enabled.display_timing,
                    incremental_present: enabled.incremental_present,
                },
                swapchain_loader,
                display_timing,
                calibrated,
                swapchain: None,
                frames: Some(frames),
                frame_index: 0,
                res: Prepared::default(),
                window_size: config.size,
                minimized: false,
                destroyed: false,
            })
        }
    }

    fn frames(&self) -> Result<&FrameSync> {
        self.frames
            .as_ref()
            .ok_or_else(|| anyhow!("frame sync already drained"))
    }

    fn bundle(&self) -> Result<&SwapchainBundle> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| anyhow!("no swapchain"))
    }

    fn image(&self, index: u32) -> Result<vk::Image> {
        self.bundle()?
            .images
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow!("swapchain image {index} out of range"))
    }

    fn retire_old_swapchain(&mut self, old: Option<SwapchainBundle>) {
        unsafe {
            if let Some(old) = old {
                old.destroy(&self.device, &self.swapchain_loader);
            }
            if let Some(stale) = self.stale_surface.take() {
                self.surface_loader.destroy_surface(stale, None);
            }
        }
    }

    unsafe fn allocate_cmds(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(self
            .device
            .allocate_command_buffers(&alloc_info)
            .context("allocate_command_buffers")?)
    }

    unsafe fn create_pool(&self, family: u32) -> Result<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: family,
            ..Default::default()
        };
        Ok(self
            .device
            .create_command_pool(&pool_info, None)
            .context("create_command_pool")?)
    }
}

impl GraphicsContext for VkContext {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn surface_size(&self) -> RenderSize {
        self.swapchain
            .as_ref()
            .map(SwapchainBundle::size)
            .unwrap_or_default()
    }

    fn set_window_size(&mut self, size: RenderSize) {
        self.window_size = size;
    }

    fn is_minimized(&self) -> bool {
        self.minimized
    }

    fn image_count(&self) -> u32 {
        self.swapchain
            .as_ref()
            .map_or(0, |b| b.images.len() as u32)
    }

    fn features(&self) -> ContextFeatures {
        self.features
    }

    // STRICT ORDER: extent check -> new swapchain (old handed over) -> retire
    // old -> depth -> command pool + per-image buffers -> begun init buffer.
    fn dispatch_prepare(&mut self) -> Result<()> {
        unsafe {
            let extent = swapchain::surface_extent(
                &self.surface_loader,
                self.phys,
                self.surface,
                self.window_size,
            )?;
            if extent.width == 0 || extent.height == 0 || self.window.is_minimized() {
                self.minimized = true;
                return Ok(());
            }
            self.minimized = false;

            let old = self.swapchain.take();
            let old_handle = match (&old, self.stale_surface) {
                (Some(b), None) => b.swapchain,
                _ => vk::SwapchainKHR::null(),
            };
            let bundle = swapchain::create_swapchain(
                &self.device,
                &self.surface_loader,
                &self.swapchain_loader,
                self.phys,
                self.surface,
                old_handle,
                extent,
                self.config.present_mode,
            )?;
            self.retire_old_swapchain(old);

            let image_count = bundle.images.len() as u32;
            self.res.depth = swapchain::create_depth(
                &self.device,
                &self.mem_props,
                self.depth_format,
                bundle.extent,
            )?;
            self.swapchain = Some(bundle);

            self.res.cmd_pool = self.create_pool(self.families.graphics)?;
            self.res.draw_cmds = self.allocate_cmds(self.res.cmd_pool, image_count)?;
            self.res.init_cmd = self.allocate_cmds(self.res.cmd_pool, 1)?[0];
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            self.device
                .begin_command_buffer(self.res.init_cmd, &begin)
                .context("begin_command_buffer(init)")?;
        }
        Ok(())
    }

    fn dispatch_load_assets(&mut self) -> Result<()> {
        if !self.config.textured {
            return Ok(());
        }
        self.res.texture = unsafe {
            texture::load(
                &self.instance,
                self.phys,
                &self.device,
                &self.mem_props,
                self.res.init_cmd,
                self.config.use_staging,
            )?
        };
        Ok(())
    }

    fn dispatch_reset(&mut self) -> Result<()> {
        debug!("resetting prepared resources");
        Ok(())
    }

    fn create_surface(&mut self) -> Result<()> {
        unsafe {
            let surface = ash_window::create_surface(
                &self.entry,
                &self.instance,
                self.display_raw,
                self.window_raw,
                None,
            )
            .context("ash_window::create_surface")?;
            for family in [self.families.graphics, self.families.present] {
                let ok = self
                    .surface_loader
                    .get_physical_device_surface_support(self.phys, family, surface)
                    .context("get_physical_device_surface_support")?;
                if !ok {
                    self.surface_loader.destroy_surface(surface, None);
                    bail!("recreated surface lost present support on family {family}");
                }
            }
            // The old swapchain still references the lost surface.
            if let Some(stale) = self.stale_surface.replace(self.surface) {
                self.surface_loader.destroy_surface(stale, None);
            }
            self.surface = surface;
        }
        info!("surface recreated");
        Ok(())
    }

    fn advance_frame(&mut self) {
        self.frame_index = (self.frame_index + 1) % FRAME_LAG;
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("device_wait_idle")
    }

    fn query_surface_extent(&mut self) -> Result<RenderSize> {
        let e = unsafe {
            swapchain::surface_extent(
                &self.surface_loader,
                self.phys,
                self.surface,
                self.window_size,
            )?
        };
        Ok(RenderSize {
            width: e.width,
            height: e.height,
        })
    }

    fn destroy_swapchain(&mut self) {
        let old = self.swapchain.take();
        self.retire_old_swapchain(old);
    }

    fn drain_frame_sync(&mut self) -> Result<()> {
        if let Some(frames) = self.frames.take() {
            unsafe { frames.drain(&self.device)? };
        }
        Ok(())
    }

    // STRICT TEARDOWN ORDER: device -> debug messenger -> surface -> instance.
    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        unsafe {
            self.device.destroy_device(None);
            if let Some(debug) = self.debug.take() {
                debug.destroy();
            }
            if let Some(stale) = self.stale_surface.take() {
                self.surface_loader.destroy_surface(stale, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
        self.destroyed = true;
        info!("vulkan context destroyed");
    }

    fn wait_frame_fence(&mut self) -> Result<()> {
        unsafe { self.frames()?.wait(&self.device, self.frame_index) }
    }

    fn restore_frame_fence(&mut self) -> Result<()> {
        let fence = self.frames()?.fences[self.frame_index];
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[], fence)
                .context("queue_submit(empty)")
        }
    }

    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus), SwapchainError> {
        let swapchain = self.bundle()?.swapchain;
        let acquired = self.frames()?.image_acquired[self.frame_index];
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                acquired,
                vk::Fence::null(),
            )
        }
        .map_err(|e| present::swapchain_error(e, "acquire_next_image"))?;
        Ok((index, present::status(suboptimal)))
    }

    fn submit_draw(&mut self, image: u32) -> Result<()> {
        let frames = self.frames()?;
        let slot = self.frame_index;
        let cmd = *self
            .res
            .draw_cmds
            .get(image as usize)
            .ok_or_else(|| anyhow!("no draw commands for image {image}"))?;
        let wait_stage = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &frames.image_acquired[slot],
            p_wait_dst_stage_mask: wait_stage.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &frames.draw_complete[slot],
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit], frames.fences[slot])
                .context("queue_submit(draw)")
        }
    }

    fn submit_ownership_transfer(&mut self, image: u32) -> Result<()> {
        let frames = self.frames()?;
        let slot = self.frame_index;
        let released = frames
            .ownership_released
            .as_ref()
            .ok_or_else(|| anyhow!("ownership transfer on a shared queue family"))?;
        let cmd = *self
            .res
            .present_cmds
            .get(image as usize)
            .ok_or_else(|| anyhow!("no ownership commands for image {image}"))?;
        let wait_stage = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &frames.draw_complete[slot],
            p_wait_dst_stage_mask: wait_stage.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &released[slot],
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.present_queue, &[submit], vk::Fence::null())
                .context("queue_submit(ownership)")
        }
    }

    fn present(&mut self, request: &PresentRequest) -> Result<SwapchainStatus, SwapchainError> {
        let swapchain = self.bundle()?.swapchain;
        let frames = self.frames()?;
        let slot = self.frame_index;
        let wait = match request.wait {
            PresentWait::DrawComplete => frames.draw_complete[slot],
            PresentWait::OwnershipReleased => frames
                .ownership_released
                .as_ref()
                .ok_or_else(|| anyhow!("no ownership semaphore to wait on"))?[slot],
        };

        // STRICT: pNext chain is present-regions -> present-times; both
        // structs and their arrays must outlive queue_present.
        let rect = request.damage.as_ref().map(present::rect_layer);
        let region = vk::PresentRegionKHR {
            rectangle_count: u32::from(rect.is_some()),
            p_rectangles: rect.as_ref().map_or(std::ptr::null(), |r| r as *const _),
            ..Default::default()
        };
        let time = request.timing.as_ref().map(present::present_time);
        let times = vk::PresentTimesInfoGOOGLE {
            s_type: vk::StructureType::PRESENT_TIMES_INFO_GOOGLE,
            swapchain_count: 1,
            p_times: time.as_ref().map_or(std::ptr::null(), |t| t as *const _),
            ..Default::default()
        };
        let timed = time.is_some() && self.features.display_timing;
        let regions = vk::PresentRegionsKHR {
            s_type: vk::StructureType::PRESENT_REGIONS_KHR,
            p_next: if timed {
                (&times as *const vk::PresentTimesInfoGOOGLE).cast()
            } else {
                std::ptr::null()
            },
            swapchain_count: 1,
            p_regions: &region,
            ..Default::default()
        };
        let with_regions = rect.is_some() && self.features.incremental_present;
        let p_next: *const std::ffi::c_void = if with_regions {
            (&regions as *const vk::PresentRegionsKHR).cast()
        } else if timed {
            (&times as *const vk::PresentTimesInfoGOOGLE).cast()
        } else {
            std::ptr::null()
        };

        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            p_next,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &request.image,
            ..Default::default()
        };
        let suboptimal = unsafe { self.swapchain_loader.queue_present(self.present_queue, &info) }
            .map_err(|e| present::swapchain_error(e, "queue_present"))?;
        Ok(present::status(suboptimal))
    }

    fn refresh_cycle_duration(&mut self) -> Result<u64> {
        let loader = self
            .display_timing
            .as_ref()
            .ok_or_else(|| anyhow!("display timing not enabled"))?;
        let swapchain = self.bundle()?.swapchain;
        let rc = unsafe { loader.get_refresh_cycle_duration(swapchain) }
            .context("get_refresh_cycle_duration")?;
        Ok(rc.refresh_duration)
    }

    fn past_presentation_timing(&mut self) -> Result<Vec<PastPresentationTiming>> {
        let loader = self
            .display_timing
            .as_ref()
            .ok_or_else(|| anyhow!("display timing not enabled"))?;
        let swapchain = self.bundle()?.swapchain;
        let past = unsafe { loader.get_past_presentation_timing(swapchain) }
            .context("get_past_presentation_timing")?;
        Ok(past.iter().map(present::past_timing).collect())
    }

    fn present_clock_ns(&self) -> Option<u64> {
        let loader = self.calibrated.as_ref()?;
        let info = vk::CalibratedTimestampInfoEXT {
            s_type: vk::StructureType::CALIBRATED_TIMESTAMP_INFO_EXT,
            time_domain: vk::TimeDomainEXT::CLOCK_MONOTONIC,
            ..Default::default()
        };
        match unsafe { loader.get_calibrated_timestamps(&[info]) } {
            Ok((stamps, _deviation)) => stamps.first().copied(),
            Err(e) => {
                debug!("get_calibrated_timestamps: {e:?}");
                None
            }
        }
    }
}

impl DeviceResources for VkContext {
    fn create_uniform_buffers(&mut self, initial: &CubeUniform) -> Result<()> {
        let bytes = initial.as_bytes();
        let size = bytes.len() as vk::DeviceSize;
        for _ in 0..self.image_count() {
            unsafe {
                let (buffer, memory) = memory::create_buffer_and_memory(
                    &self.device,
                    &self.mem_props,
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?;
                let mapped = self
                    .device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .context("map_memory(uniform)")?
                    .cast::<u8>();
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped, bytes.len());
                self.res.uniforms.push(UniformBuffer {
                    buffer,
                    memory,
                    mapped,
                });
            }
        }
        Ok(())
    }

    fn create_descriptor_layout(&mut self, desc: &DescriptorLayoutDesc) -> Result<()> {
        let (set_layout, pipeline_layout) =
            unsafe { pipeline::create_descriptor_layout(&self.device, desc)? };
        self.res.set_layout = set_layout;
        self.res.pipeline_layout = pipeline_layout;
        Ok(())
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<()> {
        let color_format = self.bundle()?.format.format;
        self.res.render_pass = unsafe {
            pipeline::create_render_pass(&self.device, desc, color_format, self.res.depth.format)?
        };
        Ok(())
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<()> {
        let (cache, pipe) = unsafe {
            pipeline::create_pipeline(
                &self.device,
                desc,
                self.res.render_pass,
                self.res.pipeline_layout,
            )?
        };
        self.res.pipeline_cache = cache;
        self.res.pipeline = pipe;
        Ok(())
    }

    fn create_present_commands(&mut self) -> Result<()> {
        unsafe {
            self.res.present_pool = self.create_pool(self.families.present)?;
            self.res.present_cmds =
                self.allocate_cmds(self.res.present_pool, self.image_count())?;
        }
        Ok(())
    }

    fn record_ownership_transfer(
        &mut self,
        image: u32,
        transfer: &OwnershipTransfer,
    ) -> Result<()> {
        let target = self.image(image)?;
        let cmd = *self
            .res
            .present_cmds
            .get(image as usize)
            .ok_or_else(|| anyhow!("no ownership command buffer for image {image}"))?;
        unsafe { record::record_ownership_acquire(&self.device, cmd, target, transfer) }
    }

    fn create_descriptor_sets(&mut self, desc: &DescriptorLayoutDesc) -> Result<()> {
        let image_count = self.image_count();
        let pool_sizes: Vec<_> = desc
            .pool_sizes(image_count)
            .into_iter()
            .map(|(kind, count)| vk::DescriptorPoolSize {
                ty: pipeline::descriptor_type(kind),
                descriptor_count: count,
            })
            .collect();
        unsafe {
            let pool_ci = vk::DescriptorPoolCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
                max_sets: image_count,
                pool_size_count: pool_sizes.len() as u32,
                p_pool_sizes: pool_sizes.as_ptr(),
                ..Default::default()
            };
            self.res.desc_pool = self
                .device
                .create_descriptor_pool(&pool_ci, None)
                .context("create_descriptor_pool")?;

            let layouts = vec![self.res.set_layout; image_count as usize];
            let alloc = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: self.res.desc_pool,
                descriptor_set_count: image_count,
                p_set_layouts: layouts.as_ptr(),
                ..Default::default()
            };
            self.res.desc_sets = self
                .device
                .allocate_descriptor_sets(&alloc)
                .context("allocate_descriptor_sets")?;

            let textured = desc.bindings.len() > 1 && self.res.texture.view != vk::ImageView::null();
            let tex_info = vk::DescriptorImageInfo {
                sampler: self.res.texture.sampler,
                image_view: self.res.texture.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            };
            let buf_infos: Vec<_> = self
                .res
                .uniforms
                .iter()
                .map(|u| vk::DescriptorBufferInfo {
                    buffer: u.buffer,
                    offset: 0,
                    range: CubeUniform::SIZE as vk::DeviceSize,
                })
                .collect();

            let mut writes = Vec::with_capacity(self.res.desc_sets.len() * 2);
            for (set, buf_info) in self.res.desc_sets.iter().zip(&buf_infos) {
                writes.push(vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: *set,
                    dst_binding: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    p_buffer_info: buf_info,
                    ..Default::default()
                });
                if textured {
                    writes.push(vk::WriteDescriptorSet {
                        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                        dst_set: *set,
                        dst_binding: 1,
                        descriptor_count: 1,
                        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        p_image_info: &tex_info,
                        ..Default::default()
                    });
                }
            }
            self.device.update_descriptor_sets(&writes, &[]);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        let bundle = self.bundle()?;
        let mut framebuffers = Vec::with_capacity(bundle.views.len());
        for &view in &bundle.views {
            let attachments = [view, self.res.depth.view];
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.res.render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: bundle.extent.width,
                height: bundle.extent.height,
                layers: 1,
                ..Default::default()
            };
            framebuffers.push(
                unsafe { self.device.create_framebuffer(&fb_info, None) }
                    .context("create_framebuffer")?,
            );
        }
        self.res.framebuffers = framebuffers;
        Ok(())
    }

    fn record_draw(&mut self, plan: &DrawPlan) -> Result<()> {
        let i = plan.image as usize;
        let missing = || anyhow!("image {i} has no prepared resources");
        let targets = record::DrawTargets {
            render_pass: self.res.render_pass,
            framebuffer: *self.res.framebuffers.get(i).ok_or_else(missing)?,
            pipeline: self.res.pipeline,
            layout: self.res.pipeline_layout,
            set: *self.res.desc_sets.get(i).ok_or_else(missing)?,
            image: self.image(plan.image)?,
        };
        let cmd = *self.res.draw_cmds.get(i).ok_or_else(missing)?;
        unsafe { record::record_draw(&self.device, cmd, plan, &targets) }
    }

    fn flush_init_commands(&mut self) -> Result<()> {
        let cmd = self.res.init_cmd;
        if cmd == vk::CommandBuffer::null() {
            return Ok(());
        }
        unsafe {
            self.device
                .end_command_buffer(cmd)
                .context("end_command_buffer(init)")?;

            let mut fence_ci = vk::FenceCreateInfo {
                s_type: vk::StructureType::FENCE_CREATE_INFO,
                ..Default::default()
            };
            if self.config.force_errors {
                // Provokes a validation error on purpose.
                fence_ci.s_type = vk::StructureType::from_raw(0);
            }
            let fence = self
                .device
                .create_fence(&fence_ci, None)
                .context("create_fence(init)")?;

            let submit = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            let done = self
                .device
                .queue_submit(self.graphics_queue, &[submit], fence)
                .and_then(|()| self.device.wait_for_fences(&[fence], true, u64::MAX));
            self.device.destroy_fence(fence, None);
            done.context("submit init commands")?;

            self.device
                .free_command_buffers(self.res.cmd_pool, &[cmd]);
            self.res.init_cmd = vk::CommandBuffer::null();
            self.res.texture.free_staging(&self.device);
        }
        Ok(())
    }

    fn write_uniform(&mut self, image: u32, bytes: &[u8]) -> Result<()> {
        let ubo = self
            .res
            .uniforms
            .get(image as usize)
            .ok_or_else(|| anyhow!("no uniform buffer for image {image}"))?;
        if bytes.len() > CubeUniform::SIZE {
            bail!("uniform write of {} bytes exceeds {}", bytes.len(), CubeUniform::SIZE);
        }
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ubo.mapped, bytes.len()) };
        Ok(())
    }

    // STRICT TEARDOWN ORDER: framebuffers -> descriptor pool -> pipeline ->
    // cache -> render pass -> layouts -> texture -> uniforms -> present pool
    // -> depth -> command pool (frees draw and init buffers).
    fn release_resources(&mut self) {
        let res = std::mem::take(&mut self.res);
        let Prepared {
            mut depth,
            cmd_pool,
            mut texture,
            uniforms,
            set_layout,
            pipeline_layout,
            render_pass,
            pipeline_cache,
            pipeline,
            present_pool,
            desc_pool,
            framebuffers,
            ..
        } = res;
        let d = &self.device;
        unsafe {
            for fb in framebuffers {
                d.destroy_framebuffer(fb, None);
            }
            d.destroy_descriptor_pool(desc_pool, None);
            d.destroy_pipeline(pipeline, None);
            d.destroy_pipeline_cache(pipeline_cache, None);
            d.destroy_render_pass(render_pass, None);
            d.destroy_pipeline_layout(pipeline_layout, None);
            d.destroy_descriptor_set_layout(set_layout, None);
            texture.destroy(d);
            for u in uniforms {
                d.destroy_buffer(u.buffer, None);
                d.free_memory(u.memory, None);
            }
            d.destroy_command_pool(present_pool, None);
            depth.destroy(d);
            d.destroy_command_pool(cmd_pool, None);
        }
    }
}

impl Drop for VkContext {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = self.wait_idle() {
            warn!("device_wait_idle on drop: {e:#}");
        }
        if let Err(e) = self.drain_frame_sync() {
            warn!("drain frame sync on drop: {e:#}");
        }
        self.release_resources();
        self.destroy_swapchain();
        self.destroy();
    }
}

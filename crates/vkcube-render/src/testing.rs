// SPDX-License-Identifier: CEPL-1.0
//! In-memory graphics context for exercising the lifecycle without a GPU.
use std::collections::{BTreeMap, VecDeque};

use anyhow::{bail, Result};
use vkcube_math::CubeUniform;

use crate::context::{
    ContextFeatures, DeviceResources, GraphicsContext, PresentRequest, QueueFamilies,
};
use crate::preparer::{DescriptorLayoutDesc, PipelineDesc, RenderPassDesc};
use crate::recorder::{DrawPlan, OwnershipTransfer};
use crate::timing::PastPresentationTiming;
use crate::{RenderSize, SwapchainError, SwapchainStatus, FRAME_LAG};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Object {
    Instance,
    Surface,
    Device,
    Fence,
    Semaphore,
    Swapchain,
    ImageView,
    DepthImage,
    DrawCommandBuffer,
    InitCommandBuffer,
    Texture,
    UniformBuffer,
    DescriptorSetLayout,
    PipelineLayout,
    RenderPass,
    PipelineCache,
    Pipeline,
    PresentCommandPool,
    OwnershipCommandBuffer,
    DescriptorPool,
    DescriptorSet,
    Framebuffer,
}

const PREPARE_SCOPED: [Object; 15] = [
    Object::DepthImage,
    Object::DrawCommandBuffer,
    Object::InitCommandBuffer,
    Object::Texture,
    Object::UniformBuffer,
    Object::DescriptorSetLayout,
    Object::PipelineLayout,
    Object::RenderPass,
    Object::PipelineCache,
    Object::Pipeline,
    Object::PresentCommandPool,
    Object::OwnershipCommandBuffer,
    Object::DescriptorPool,
    Object::DescriptorSet,
    Object::Framebuffer,
];

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    DispatchPrepare,
    LoadAssets,
    DispatchReset,
    CreateSurface,
    AdvanceFrame,
    WaitIdle,
    WaitFence(usize),
    RestoreFence(usize),
    Acquire,
    SubmitDraw { image: u32, slot: usize },
    SubmitOwnership(u32),
    Present(PresentRequest),
    RecordOwnership(u32, OwnershipTransfer),
    RecordDraw(DrawPlan),
    WriteUniform { image: u32, len: usize },
    FlushInit,
    Release,
    DestroySwapchain,
    DrainFrameSync,
    Destroy,
}

/// Result to hand back from a scripted acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scripted {
    Suboptimal,
    OutOfDate,
    SurfaceLost,
    Fatal,
}

#[derive(Clone, Copy, Debug, Default)]
struct FenceSlot {
    signaled: bool,
    pending: bool,
}

pub struct ScriptedContext {
    pub families: QueueFamilies,
    pub image_count: u32,
    pub features: ContextFeatures,
    pub textured: bool,
    /// What the window system reports right now.
    pub surface: RenderSize,
    pub clock: Option<u64>,
    pub refresh_ns: u64,
    pub calls: Vec<Call>,
    pub max_in_flight: usize,
    pub layout: Option<DescriptorLayoutDesc>,
    pub uniform_len: usize,
    swapchain_size: RenderSize,
    minimized: bool,
    live: BTreeMap<Object, usize>,
    fences: [FenceSlot; FRAME_LAG],
    in_flight: usize,
    slot: usize,
    next_image: u32,
    acquires: u32,
    presents: u32,
    acquire_script: BTreeMap<u32, Scripted>,
    present_script: BTreeMap<u32, Scripted>,
    timings: VecDeque<Vec<PastPresentationTiming>>,
}

impl ScriptedContext {
    pub fn new(families: QueueFamilies, image_count: u32, surface: RenderSize) -> Self {
        let semaphores_per_slot = if families.separate() { 3 } else { 2 };
        let live = BTreeMap::from([
            (Object::Instance, 1),
            (Object::Surface, 1),
            (Object::Device, 1),
            (Object::Fence, FRAME_LAG),
            (Object::Semaphore, FRAME_LAG * semaphores_per_slot),
        ]);
        Self {
            families,
            image_count,
            features: ContextFeatures::default(),
            textured: true,
            surface,
            clock: Some(1_000_000_000),
            refresh_ns: 16_666_667,
            calls: Vec::new(),
            max_in_flight: 0,
            layout: None,
            uniform_len: 0,
            swapchain_size: RenderSize::default(),
            minimized: false,
            live,
            fences: [FenceSlot {
                signaled: true,
                pending: false,
            }; FRAME_LAG],
            in_flight: 0,
            slot: 0,
            next_image: 0,
            acquires: 0,
            presents: 0,
            acquire_script: BTreeMap::new(),
            present_script: BTreeMap::new(),
            timings: VecDeque::new(),
        }
    }

    pub fn single_queue(image_count: u32, surface: RenderSize) -> Self {
        Self::new(QueueFamilies::shared(0), image_count, surface)
    }

    /// Make the `nth` acquire (1-based, counting retries) return `outcome`.
    pub fn script_acquire(&mut self, nth: u32, outcome: Scripted) {
        self.acquire_script.insert(nth, outcome);
    }

    pub fn script_present(&mut self, nth: u32, outcome: Scripted) {
        self.present_script.insert(nth, outcome);
    }

    pub fn queue_timings(&mut self, batch: Vec<PastPresentationTiming>) {
        self.timings.push_back(batch);
    }

    pub fn live(&self, kind: Object) -> usize {
        self.live.get(&kind).copied().unwrap_or(0)
    }

    pub fn live_objects(&self) -> BTreeMap<Object, usize> {
        self.live
            .iter()
            .filter(|&(_, &n)| n > 0)
            .map(|(&k, &n)| (k, n))
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn presents(&self) -> Vec<PresentRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Present(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn draw_plans(&self) -> Vec<DrawPlan> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::RecordDraw(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn add(&mut self, kind: Object, n: usize) {
        *self.live.entry(kind).or_insert(0) += n;
    }

    fn clear(&mut self, kind: Object) {
        self.live.insert(kind, 0);
    }

    fn retire_pending(&mut self, slot: usize) {
        let fence = &mut self.fences[slot];
        if fence.pending {
            fence.pending = false;
            fence.signaled = true;
            self.in_flight -= 1;
        }
    }

    fn submit_into_fence(&mut self) -> Result<()> {
        let fence = &mut self.fences[self.slot];
        if fence.signaled || fence.pending {
            bail!("slot {} submitted without a wait-and-reset", self.slot);
        }
        fence.pending = true;
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        Ok(())
    }

    fn scripted<T>(outcome: Option<Scripted>, ok: T) -> Result<T, SwapchainError> {
        match outcome {
            None | Some(Scripted::Suboptimal) => Ok(ok),
            Some(Scripted::OutOfDate) => Err(SwapchainError::OutOfDate),
            Some(Scripted::SurfaceLost) => Err(SwapchainError::SurfaceLost),
            Some(Scripted::Fatal) => Err(anyhow::anyhow!("device lost").into()),
        }
    }
}

impl GraphicsContext for ScriptedContext {
    fn queue_families(&self) -> QueueFamilies {
        self.families
    }
    fn surface_size(&self) -> RenderSize {
        self.swapchain_size
    }
    fn set_window_size(&mut self, size: RenderSize) {
        self.surface = size;
    }
    fn is_minimized(&self) -> bool {
        self.minimized
    }
    fn image_count(&self) -> u32 {
        self.image_count
    }
    fn features(&self) -> ContextFeatures {
        self.features
    }

    fn dispatch_prepare(&mut self) -> Result<()> {
        self.calls.push(Call::DispatchPrepare);
        if self.surface.is_empty() {
            self.minimized = true;
            return Ok(());
        }
        self.minimized = false;
        // Old swapchain is handed over and retired.
        self.clear(Object::Swapchain);
        self.clear(Object::ImageView);
        let n = self.image_count as usize;
        self.add(Object::Swapchain, 1);
        self.add(Object::ImageView, n);
        self.add(Object::DepthImage, 1);
        self.add(Object::DrawCommandBuffer, n);
        self.add(Object::InitCommandBuffer, 1);
        self.swapchain_size = self.surface;
        self.next_image = 0;
        Ok(())
    }

    fn dispatch_load_assets(&mut self) -> Result<()> {
        self.calls.push(Call::LoadAssets);
        if self.textured {
            self.add(Object::Texture, 1);
        }
        Ok(())
    }

    fn dispatch_reset(&mut self) -> Result<()> {
        self.calls.push(Call::DispatchReset);
        Ok(())
    }

    fn create_surface(&mut self) -> Result<()> {
        self.calls.push(Call::CreateSurface);
        Ok(())
    }

    fn advance_frame(&mut self) {
        self.calls.push(Call::AdvanceFrame);
        self.slot = (self.slot + 1) % FRAME_LAG;
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.calls.push(Call::WaitIdle);
        for slot in 0..FRAME_LAG {
            self.retire_pending(slot);
        }
        Ok(())
    }

    fn query_surface_extent(&mut self) -> Result<RenderSize> {
        Ok(self.surface)
    }

    fn destroy_swapchain(&mut self) {
        self.calls.push(Call::DestroySwapchain);
        self.clear(Object::Swapchain);
        self.clear(Object::ImageView);
    }

    fn drain_frame_sync(&mut self) -> Result<()> {
        self.calls.push(Call::DrainFrameSync);
        for slot in 0..FRAME_LAG {
            self.retire_pending(slot);
            if !self.fences[slot].signaled {
                bail!("slot {slot} fence reset but never resubmitted");
            }
        }
        self.clear(Object::Fence);
        self.clear(Object::Semaphore);
        Ok(())
    }

    fn destroy(&mut self) {
        self.calls.push(Call::Destroy);
        self.clear(Object::Device);
        self.clear(Object::Surface);
        self.clear(Object::Instance);
    }

    fn wait_frame_fence(&mut self) -> Result<()> {
        self.calls.push(Call::WaitFence(self.slot));
        let slot = self.slot;
        self.retire_pending(slot);
        if !self.fences[slot].signaled {
            bail!("deadlock: slot {slot} fence was reset and never submitted");
        }
        self.fences[slot].signaled = false;
        Ok(())
    }

    fn restore_frame_fence(&mut self) -> Result<()> {
        self.calls.push(Call::RestoreFence(self.slot));
        self.submit_into_fence()
    }

    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus), SwapchainError> {
        self.calls.push(Call::Acquire);
        self.acquires += 1;
        let outcome = self.acquire_script.remove(&self.acquires);
        let image = self.next_image;
        let status = match outcome {
            Some(Scripted::Suboptimal) => SwapchainStatus::Suboptimal,
            _ => SwapchainStatus::Optimal,
        };
        let acquired = Self::scripted(outcome, (image, status))?;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(acquired)
    }

    fn submit_draw(&mut self, image: u32) -> Result<()> {
        self.calls.push(Call::SubmitDraw {
            image,
            slot: self.slot,
        });
        self.submit_into_fence()
    }

    fn submit_ownership_transfer(&mut self, image: u32) -> Result<()> {
        if !self.families.separate() {
            bail!("ownership transfer on a shared queue family");
        }
        self.calls.push(Call::SubmitOwnership(image));
        Ok(())
    }

    fn present(&mut self, request: &PresentRequest) -> Result<SwapchainStatus, SwapchainError> {
        self.calls.push(Call::Present(*request));
        self.presents += 1;
        let outcome = self.present_script.remove(&self.presents);
        let status = match outcome {
            Some(Scripted::Suboptimal) => SwapchainStatus::Suboptimal,
            _ => SwapchainStatus::Optimal,
        };
        Self::scripted(outcome, status)
    }

    fn refresh_cycle_duration(&mut self) -> Result<u64> {
        Ok(self.refresh_ns)
    }

    fn past_presentation_timing(&mut self) -> Result<Vec<PastPresentationTiming>> {
        Ok(self.timings.pop_front().unwrap_or_default())
    }

    fn present_clock_ns(&self) -> Option<u64> {
        self.clock
    }
}

impl DeviceResources for ScriptedContext {
    fn create_uniform_buffers(&mut self, initial: &CubeUniform) -> Result<()> {
        self.uniform_len = initial.as_bytes().len();
        self.add(Object::UniformBuffer, self.image_count as usize);
        Ok(())
    }

    fn create_descriptor_layout(&mut self, desc: &DescriptorLayoutDesc) -> Result<()> {
        self.layout = Some(desc.clone());
        self.add(Object::DescriptorSetLayout, 1);
        self.add(Object::PipelineLayout, 1);
        Ok(())
    }

    fn create_render_pass(&mut self, _desc: &RenderPassDesc) -> Result<()> {
        self.add(Object::RenderPass, 1);
        Ok(())
    }

    fn create_pipeline(&mut self, _desc: &PipelineDesc) -> Result<()> {
        self.add(Object::PipelineCache, 1);
        self.add(Object::Pipeline, 1);
        Ok(())
    }

    fn create_present_commands(&mut self) -> Result<()> {
        self.add(Object::PresentCommandPool, 1);
        self.add(Object::OwnershipCommandBuffer, self.image_count as usize);
        Ok(())
    }

    fn record_ownership_transfer(
        &mut self,
        image: u32,
        transfer: &OwnershipTransfer,
    ) -> Result<()> {
        self.calls.push(Call::RecordOwnership(image, *transfer));
        Ok(())
    }

    fn create_descriptor_sets(&mut self, _desc: &DescriptorLayoutDesc) -> Result<()> {
        self.add(Object::DescriptorPool, 1);
        self.add(Object::DescriptorSet, self.image_count as usize);
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        self.add(Object::Framebuffer, self.image_count as usize);
        Ok(())
    }

    fn record_draw(&mut self, plan: &DrawPlan) -> Result<()> {
        self.calls.push(Call::RecordDraw(*plan));
        Ok(())
    }

    fn flush_init_commands(&mut self) -> Result<()> {
        self.calls.push(Call::FlushInit);
        if self.live(Object::InitCommandBuffer) == 0 {
            bail!("no init command buffer to flush");
        }
        self.clear(Object::InitCommandBuffer);
        Ok(())
    }

    fn write_uniform(&mut self, image: u32, bytes: &[u8]) -> Result<()> {
        if image >= self.image_count {
            bail!("uniform write to image {image} out of range");
        }
        self.calls.push(Call::WriteUniform {
            image,
            len: bytes.len(),
        });
        Ok(())
    }

    fn release_resources(&mut self) {
        self.calls.push(Call::Release);
        for kind in PREPARE_SCOPED {
            self.clear(kind);
        }
    }
}

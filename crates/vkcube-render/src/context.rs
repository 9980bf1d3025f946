// SPDX-License-Identifier: CEPL-1.0
//! The seams between the frame lifecycle and whatever owns the device.
//!
//! [`GraphicsContext`] covers the objects the lifecycle borrows but never
//! creates itself: instance, device, queues, surface, swapchain and the
//! FRAME_LAG synchronization set. [`DeviceResources`] covers the objects a
//! prepare cycle builds and a resize or cleanup tears down again.
use anyhow::Result;
use vkcube_math::CubeUniform;

use crate::preparer::{DescriptorLayoutDesc, PipelineDesc, RenderPassDesc};
use crate::recorder::{DamageRect, DrawPlan, OwnershipTransfer};
use crate::timing::{PastPresentationTiming, PresentTime};
use crate::{RenderSize, SwapchainError, SwapchainStatus};

/// Queue family indices chosen at device creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn shared(index: u32) -> Self {
        Self {
            graphics: index,
            present: index,
        }
    }

    /// Graphics and present run on different families, so images change
    /// hands before every present.
    pub fn separate(&self) -> bool {
        self.graphics != self.present
    }
}

/// Optional device capabilities that were both requested and enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextFeatures {
    pub display_timing: bool,
    pub incremental_present: bool,
}

/// Which semaphore the present waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentWait {
    DrawComplete,
    OwnershipReleased,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentRequest {
    pub image: u32,
    pub wait: PresentWait,
    pub damage: Option<DamageRect>,
    pub timing: Option<PresentTime>,
}

pub trait GraphicsContext {
    fn queue_families(&self) -> QueueFamilies;
    /// Extent of the current swapchain (the tracked width/height).
    fn surface_size(&self) -> RenderSize;
    /// Size hint used when the surface leaves the extent up to the swapchain.
    fn set_window_size(&mut self, size: RenderSize);
    /// Set by the last `dispatch_prepare` when the surface had zero area.
    fn is_minimized(&self) -> bool;
    fn image_count(&self) -> u32;
    fn features(&self) -> ContextFeatures;

    /// (Re)create the swapchain, its views, the depth attachment, per-image
    /// command buffers and a begun init command buffer. Creates nothing when
    /// the surface is minimized.
    fn dispatch_prepare(&mut self) -> Result<()>;
    /// Load textures, recording uploads into the init command buffer.
    fn dispatch_load_assets(&mut self) -> Result<()>;
    /// Notification sent before prepared resources are torn down.
    fn dispatch_reset(&mut self) -> Result<()>;
    fn create_surface(&mut self) -> Result<()>;
    /// Rotate to the next FRAME_LAG slot. Called once per present.
    fn advance_frame(&mut self);
    fn wait_idle(&mut self) -> Result<()>;
    /// Current extent straight from the surface capabilities.
    fn query_surface_extent(&mut self) -> Result<RenderSize>;
    fn destroy_swapchain(&mut self);
    /// Wait on every FRAME_LAG fence, then destroy the fences and semaphores.
    fn drain_frame_sync(&mut self) -> Result<()>;
    /// Destroy device, debug messenger, surface and instance.
    fn destroy(&mut self);

    /// Block on the active slot's fence, then reset it.
    fn wait_frame_fence(&mut self) -> Result<()>;
    /// Signal the active slot's fence again with an empty submission.
    fn restore_frame_fence(&mut self) -> Result<()>;
    fn acquire_next_image(&mut self) -> Result<(u32, SwapchainStatus), SwapchainError>;
    /// Graphics queue: wait image-acquired, signal draw-complete, retire into
    /// the active fence.
    fn submit_draw(&mut self, image: u32) -> Result<()>;
    /// Present queue: wait draw-complete, signal ownership-released, no fence.
    fn submit_ownership_transfer(&mut self, image: u32) -> Result<()>;
    fn present(&mut self, request: &PresentRequest) -> Result<SwapchainStatus, SwapchainError>;

    fn refresh_cycle_duration(&mut self) -> Result<u64>;
    fn past_presentation_timing(&mut self) -> Result<Vec<PastPresentationTiming>>;
    /// Nanoseconds on the presentation engine's clock, if it can be read.
    fn present_clock_ns(&self) -> Option<u64>;
}

pub trait DeviceResources {
    /// One persistently mapped uniform buffer per swapchain image.
    fn create_uniform_buffers(&mut self, initial: &CubeUniform) -> Result<()>;
    /// Descriptor set layout plus the pipeline layout built on it.
    fn create_descriptor_layout(&mut self, desc: &DescriptorLayoutDesc) -> Result<()>;
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<()>;
    /// Pipeline cache plus the graphics pipeline.
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<()>;
    /// Present-family command pool and one ownership command buffer per image.
    fn create_present_commands(&mut self) -> Result<()>;
    fn record_ownership_transfer(&mut self, image: u32, transfer: &OwnershipTransfer)
        -> Result<()>;
    fn create_descriptor_sets(&mut self, desc: &DescriptorLayoutDesc) -> Result<()>;
    fn create_framebuffers(&mut self) -> Result<()>;
    fn record_draw(&mut self, plan: &DrawPlan) -> Result<()>;
    /// End, submit and wait on the init command buffer, then free it.
    fn flush_init_commands(&mut self) -> Result<()>;
    /// Copy `bytes` to the start of `image`'s mapped uniform buffer.
    fn write_uniform(&mut self, image: u32, bytes: &[u8]) -> Result<()>;
    /// Destroy everything the calls above created, plus the depth attachment
    /// and per-image command buffers from `dispatch_prepare`.
    fn release_resources(&mut self);
}

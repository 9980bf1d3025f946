// SPDX-License-Identifier: CEPL-1.0
//! Frame lifecycle for the spinning cube: prepare, per-frame acquire, submit
//! and present, adaptive present timing, resize and cleanup. The graphics API
//! sits behind [`GraphicsContext`] and [`DeviceResources`].
use anyhow::Result;

mod config;
mod context;
mod error;
mod lifecycle;
pub mod preparer;
pub mod recorder;
mod scheduler;
mod session;
pub mod timing;

#[cfg(test)]
mod testing;

pub use config::{PresentModePref, StartupConfig};
pub use context::{
    ContextFeatures, DeviceResources, GraphicsContext, PresentRequest, PresentWait,
    QueueFamilies,
};
pub use error::{SwapchainError, SwapchainStatus};
pub use lifecycle::{CubeRenderer, LifecycleState};
pub use session::{DemoKey, FrameSession};

/// Frames that may be submitted but not yet fence-confirmed at once.
pub const FRAME_LAG: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub trait Renderer {
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn handle_key(&mut self, key: DemoKey);
    fn should_quit(&self) -> bool;
}

impl<C: GraphicsContext + DeviceResources> Renderer for CubeRenderer<C> {
    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if self.is_prepared() && size == self.context().surface_size() {
            return Ok(());
        }
        self.context_mut().set_window_size(size);
        CubeRenderer::resize(self)
    }

    fn render(&mut self) -> Result<()> {
        self.run_frame()
    }

    fn handle_key(&mut self, key: DemoKey) {
        self.session_mut().handle_key(key);
    }

    fn should_quit(&self) -> bool {
        self.session().should_quit()
    }
}

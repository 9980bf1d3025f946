// SPDX-License-Identifier: CEPL-1.0
use anyhow::{bail, Context, Result};
use tracing::{debug, error, info};

use crate::config::StartupConfig;
use crate::context::{DeviceResources, GraphicsContext};
use crate::preparer::build_resources;
use crate::session::FrameSession;
use crate::timing::PresentTimer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Unprepared,
    Preparing,
    Prepared,
    Resizing,
    CleaningUp,
    /// Terminal. Device and instance are gone.
    Destroyed,
}

/// Drives one graphics context through prepare, steady-state frames, resize
/// and cleanup.
pub struct CubeRenderer<C: GraphicsContext + DeviceResources> {
    pub(crate) ctx: C,
    pub(crate) config: StartupConfig,
    pub(crate) session: FrameSession,
    state: LifecycleState,
    // Prepare-scoped objects exist and must be torn down.
    resources_built: bool,
}

impl<C: GraphicsContext + DeviceResources> CubeRenderer<C> {
    pub fn new(ctx: C, config: StartupConfig) -> Self {
        let session = FrameSession::new(&config);
        Self {
            ctx,
            config,
            session,
            state: LifecycleState::Unprepared,
            resources_built: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_prepared(&self) -> bool {
        self.state == LifecycleState::Prepared
    }

    pub fn session(&self) -> &FrameSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FrameSession {
        &mut self.session
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Build the swapchain and everything drawn with it. A minimized surface
    /// leaves the renderer unprepared without creating anything.
    pub fn prepare(&mut self) -> Result<()> {
        if self.state == LifecycleState::Destroyed {
            bail!("prepare after cleanup");
        }
        if self.state == LifecycleState::Prepared {
            debug!("already prepared");
            return Ok(());
        }
        self.state = LifecycleState::Preparing;

        self.ctx.dispatch_prepare().context("dispatch_prepare")?;
        if self.ctx.is_minimized() {
            self.state = LifecycleState::Unprepared;
            info!("surface minimized, prepare deferred");
            return Ok(());
        }

        self.resources_built = true;
        build_resources(&mut self.ctx, &self.config, &mut self.session)?;
        self.session.current_buffer = 0;

        self.session.timer = if self.ctx.features().display_timing {
            let refresh = self
                .ctx
                .refresh_cycle_duration()
                .context("get_refresh_cycle_duration")?;
            info!(refresh_ns = refresh, "display timing active");
            Some(PresentTimer::new(refresh))
        } else {
            None
        };

        self.state = LifecycleState::Prepared;
        let size = self.ctx.surface_size();
        info!(
            "prepared {}x{} with {} images",
            size.width,
            size.height,
            self.ctx.image_count()
        );
        Ok(())
    }

    /// Rebuild after the swapchain stopped matching the surface.
    pub fn resize(&mut self) -> Result<()> {
        if !self.is_prepared() {
            // Never prepared, or waiting out a minimize.
            if self.state == LifecycleState::Unprepared && self.ctx.is_minimized() {
                self.prepare()?;
            }
            return Ok(());
        }

        self.state = LifecycleState::Resizing;
        self.ctx.wait_idle().context("device_wait_idle (resize)")?;
        self.teardown()?;
        self.prepare()
    }

    /// Terminal shutdown. Safe to call more than once.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.state == LifecycleState::Destroyed {
            return Ok(());
        }
        self.state = LifecycleState::CleaningUp;

        self.ctx.wait_idle().context("device_wait_idle (cleanup)")?;
        self.ctx.drain_frame_sync().context("drain frame sync")?;
        self.teardown()?;
        self.ctx.destroy_swapchain();
        self.ctx.wait_idle().context("device_wait_idle (final)")?;
        self.ctx.destroy();

        self.state = LifecycleState::Destroyed;
        info!("renderer cleaned up");
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        if !self.resources_built {
            return Ok(());
        }
        self.ctx.dispatch_reset().context("dispatch_reset")?;
        self.ctx.release_resources();
        self.resources_built = false;
        Ok(())
    }
}

impl<C: GraphicsContext + DeviceResources> Drop for CubeRenderer<C> {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            error!("cleanup on drop failed: {e:#}");
        }
    }
}

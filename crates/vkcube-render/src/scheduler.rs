// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use tracing::{debug, warn};
use vkcube_math::CubeUniform;

use crate::context::{DeviceResources, GraphicsContext, PresentRequest, PresentWait};
use crate::lifecycle::CubeRenderer;
use crate::recorder::damage_rect;
use crate::{SwapchainError, SwapchainStatus};

impl<C: GraphicsContext + DeviceResources> CubeRenderer<C> {
    /// One tick of the frame loop: draw unless unprepared, paused or done,
    /// then count the frame.
    pub fn run_frame(&mut self) -> Result<()> {
        if !self.is_prepared() || self.session.is_paused() || self.session.should_quit() {
            return Ok(());
        }
        self.draw()?;
        self.session.finish_frame();
        Ok(())
    }

    // STRICT PER-FRAME ORDER:
    // 1) wait + reset this slot's fence (bounds frames in flight to FRAME_LAG)
    // 2) acquire (signals image-acquired)
    // 3) uniform update, then timing update
    // 4) graphics submit (waits image-acquired, signals draw-complete, fence)
    // 5) ownership submit on the present queue when families differ
    // 6) present (waits draw-complete or ownership-released)
    // 7) advance the frame slot, then react to the present result
    pub fn draw(&mut self) -> Result<()> {
        self.ctx
            .wait_frame_fence()
            .context("wait_for_fences(frame)")?;

        // Until submit_draw succeeds nothing retires into the slot's fence,
        // so every exit before it must signal the fence again.
        let (image, acquired) = match self.acquire_and_submit() {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("surface minimized during acquire, skipping frame");
                return self
                    .ctx
                    .restore_frame_fence()
                    .context("restore frame fence");
            }
            Err(e) => {
                if let Err(restore) = self.ctx.restore_frame_fence() {
                    warn!("restore frame fence after failed frame: {restore:#}");
                }
                return Err(e);
            }
        };
        let features = self.ctx.features();

        let separate = self.ctx.queue_families().separate();
        if separate {
            self.ctx
                .submit_ownership_transfer(image)
                .context("queue_submit(ownership)")?;
        }

        let clock = self.ctx.present_clock_ns();
        let request = PresentRequest {
            image,
            wait: if separate {
                PresentWait::OwnershipReleased
            } else {
                PresentWait::DrawComplete
            },
            damage: features
                .incremental_present
                .then(|| damage_rect(self.ctx.surface_size())),
            timing: self
                .session
                .timer
                .as_mut()
                .filter(|_| features.display_timing)
                .map(|timer| timer.next_present_time(clock)),
        };
        let presented = self.ctx.present(&request);
        self.ctx.advance_frame();

        match presented {
            Ok(SwapchainStatus::Suboptimal) => self.resize_if_extent_changed(),
            Ok(SwapchainStatus::Optimal) if acquired == SwapchainStatus::Suboptimal => {
                self.resize_if_extent_changed()
            }
            Ok(SwapchainStatus::Optimal) => Ok(()),
            Err(SwapchainError::OutOfDate) => {
                debug!("present: out of date, resizing");
                self.resize()
            }
            Err(SwapchainError::SurfaceLost) => {
                debug!("present: surface lost, recreating");
                self.ctx.create_surface().context("create_surface")?;
                self.resize()
            }
            Err(SwapchainError::Fatal(e)) => Err(e.context("queue_present")),
        }
    }

    /// Steps 2-4. `None` when recovery left nothing to draw into.
    fn acquire_and_submit(&mut self) -> Result<Option<(u32, SwapchainStatus)>> {
        let (image, acquired) = loop {
            match self.ctx.acquire_next_image() {
                Ok(found) => break found,
                Err(SwapchainError::OutOfDate) => {
                    debug!("acquire: out of date, resizing");
                    self.resize()?;
                }
                Err(SwapchainError::SurfaceLost) => {
                    debug!("acquire: surface lost, recreating");
                    self.ctx.create_surface().context("create_surface")?;
                    self.resize()?;
                }
                Err(SwapchainError::Fatal(e)) => return Err(e.context("acquire_next_image")),
            }
            if !self.is_prepared() {
                return Ok(None);
            }
        };
        self.session.current_buffer = image;

        self.update_data_buffer(image)?;

        if self.ctx.features().display_timing {
            if let Some(timer) = self.session.timer.as_mut() {
                let past = self
                    .ctx
                    .past_presentation_timing()
                    .context("get_past_presentation_timing")?;
                timer.update_target_ipd(&past);
            }
        }

        self.ctx.submit_draw(image).context("queue_submit(draw)")?;
        Ok(Some((image, acquired)))
    }

    /// Spin the model and write the new MVP into `image`'s uniform buffer.
    fn update_data_buffer(&mut self, image: u32) -> Result<()> {
        let mvp = self.session.spin();
        self.ctx
            .write_uniform(image, &CubeUniform::mvp_bytes(&mvp))
            .context("write uniform")
    }

    // Suboptimal can simply mean the window is mid-resize.
    fn resize_if_extent_changed(&mut self) -> Result<()> {
        let current = self
            .ctx
            .query_surface_extent()
            .context("get_physical_device_surface_capabilities")?;
        if current != self.ctx.surface_size() {
            debug!(
                "suboptimal: surface is {}x{}, resizing",
                current.width, current.height
            );
            self.resize()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::recorder::damage_rect;
    use crate::testing::{Call, Scripted, ScriptedContext};
    use crate::timing::PastPresentationTiming;
    use crate::{
        CubeRenderer, DemoKey, GraphicsContext, LifecycleState, PresentWait, QueueFamilies,
        RenderSize, Renderer, StartupConfig, FRAME_LAG,
    };

    const SQUARE: RenderSize = RenderSize {
        width: 500,
        height: 500,
    };

    fn prepared(ctx: ScriptedContext) -> CubeRenderer<ScriptedContext> {
        let mut r = CubeRenderer::new(ctx, StartupConfig::default());
        r.prepare().unwrap();
        r
    }

    fn run(r: &mut CubeRenderer<ScriptedContext>, frames: usize) {
        for _ in 0..frames {
            r.run_frame().unwrap();
        }
    }

    #[test]
    fn frames_in_flight_never_exceed_frame_lag() {
        let mut r = prepared(ScriptedContext::single_queue(3, SQUARE));
        run(&mut r, 50);

        let ctx = r.context();
        assert!(ctx.max_in_flight <= FRAME_LAG);
        assert_eq!(ctx.max_in_flight, FRAME_LAG);
        assert!(ctx.in_flight() <= FRAME_LAG);

        let mut waited = None;
        for call in &ctx.calls {
            match call {
                Call::WaitFence(slot) => waited = Some(*slot),
                Call::SubmitDraw { slot, .. } => {
                    assert_eq!(waited.take(), Some(*slot), "submit without fence wait");
                }
                _ => {}
            }
        }
    }

    #[test]
    fn default_square_frame() {
        let mut r = prepared(ScriptedContext::single_queue(2, SQUARE));
        run(&mut r, 1);

        let ctx = r.context();
        let plan = ctx.draw_plans()[0];
        assert_eq!(
            (plan.viewport.x, plan.viewport.y, plan.viewport.width, plan.viewport.height),
            (0.0, 0.0, 500.0, 500.0)
        );
        assert_eq!(ctx.count(|c| matches!(c, Call::SubmitOwnership(_))), 0);
        let present = ctx.presents()[0];
        assert_eq!(present.wait, PresentWait::DrawComplete);
        assert_eq!(present.damage, None);
        assert_eq!(present.timing, None);

        r.handle_key(DemoKey::Right);
        assert!((r.session().spin_angle() - 4.2).abs() < 1e-6);
    }

    #[test]
    fn wide_surface_viewport() {
        let r = prepared(ScriptedContext::single_queue(
            2,
            RenderSize {
                width: 800,
                height: 500,
            },
        ));
        let vp = r.context().draw_plans()[0].viewport;
        assert_eq!((vp.x, vp.y, vp.width), (150.0, 0.0, 500.0));
    }

    #[test]
    fn out_of_date_acquire_resizes_once() {
        let mut ctx = ScriptedContext::single_queue(3, SQUARE);
        ctx.script_acquire(10, Scripted::OutOfDate);
        let mut r = prepared(ctx);

        run(&mut r, 10);

        let ctx = r.context();
        assert_eq!(ctx.count(|c| *c == Call::DispatchReset), 1);
        assert_eq!(ctx.count(|c| *c == Call::DispatchPrepare), 2);
        assert_eq!(ctx.count(|c| *c == Call::Acquire), 11);
        assert_eq!(ctx.presents().len(), 10);
        assert_eq!(ctx.presents()[9].image, 0);
        assert_eq!(r.session().current_buffer(), 0);
        assert_eq!(r.session().cur_frame(), 10);
        assert!(r.is_prepared());
    }

    #[test]
    fn surface_lost_recreates_surface_then_resizes() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(2, Scripted::SurfaceLost);
        ctx.script_present(4, Scripted::SurfaceLost);
        let mut r = prepared(ctx);

        run(&mut r, 5);

        let ctx = r.context();
        assert_eq!(ctx.count(|c| *c == Call::CreateSurface), 2);
        assert_eq!(ctx.count(|c| *c == Call::DispatchReset), 2);
        assert_eq!(ctx.presents().len(), 5);
    }

    #[test]
    fn out_of_date_present_resizes() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_present(1, Scripted::OutOfDate);
        let mut r = prepared(ctx);
        run(&mut r, 2);
        assert_eq!(r.context().count(|c| *c == Call::DispatchReset), 1);
        assert!(r.is_prepared());
    }

    #[test]
    fn suboptimal_present_resizes_only_on_extent_change() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_present(1, Scripted::Suboptimal);
        ctx.script_present(2, Scripted::Suboptimal);
        let mut r = prepared(ctx);

        run(&mut r, 1);
        assert_eq!(r.context().count(|c| *c == Call::DispatchReset), 0);

        let wide = RenderSize {
            width: 640,
            height: 480,
        };
        r.context_mut().surface = wide;
        run(&mut r, 1);
        assert_eq!(r.context().count(|c| *c == Call::DispatchReset), 1);
        assert_eq!(r.context().surface_size(), wide);
    }

    #[test]
    fn suboptimal_acquire_checks_extent_after_present() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(1, Scripted::Suboptimal);
        let mut r = prepared(ctx);
        r.context_mut().surface = RenderSize {
            width: 300,
            height: 200,
        };
        run(&mut r, 1);
        assert_eq!(r.context().presents().len(), 1);
        assert_eq!(r.context().count(|c| *c == Call::DispatchReset), 1);
    }

    #[test]
    fn separate_families_hand_images_to_present_queue() {
        let families = QueueFamilies {
            graphics: 1,
            present: 0,
        };
        let mut r = prepared(ScriptedContext::new(families, 3, SQUARE));
        run(&mut r, 4);

        let ctx = r.context();
        let submitted: Vec<_> = ctx
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::SubmitDraw { image, .. } => Some(*image),
                _ => None,
            })
            .collect();
        let handed: Vec<_> = ctx
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::SubmitOwnership(image) => Some(*image),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, handed);
        assert!(ctx
            .presents()
            .iter()
            .all(|p| p.wait == PresentWait::OwnershipReleased));
    }

    #[test]
    fn minimize_during_recovery_skips_frame_without_deadlock() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(3, Scripted::OutOfDate);
        let mut r = prepared(ctx);
        run(&mut r, 2);

        r.context_mut().surface = RenderSize::default();
        r.run_frame().unwrap();
        assert_eq!(r.state(), LifecycleState::Unprepared);
        assert_eq!(r.context().count(|c| matches!(c, Call::RestoreFence(_))), 1);
        assert_eq!(r.session().cur_frame(), 3);

        r.run_frame().unwrap();
        assert_eq!(r.context().presents().len(), 2);

        Renderer::resize(&mut r, SQUARE).unwrap();
        assert!(r.is_prepared());
        run(&mut r, 4);
        assert_eq!(r.context().presents().len(), 6);
        assert!(r.context().max_in_flight <= FRAME_LAG);
    }

    #[test]
    fn fatal_acquire_is_returned() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(1, Scripted::Fatal);
        let mut r = prepared(ctx);
        let err = r.run_frame().unwrap_err();
        assert!(format!("{err:#}").contains("device lost"));
        assert_eq!(r.session().cur_frame(), 0);
    }

    #[test]
    fn fatal_acquire_hands_fence_back_for_cleanup() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(1, Scripted::Fatal);
        let mut r = prepared(ctx);
        assert!(r.run_frame().is_err());
        assert_eq!(r.context().in_flight(), 1);
        assert_eq!(r.context().count(|c| matches!(c, Call::RestoreFence(0))), 1);

        r.cleanup().unwrap();
        assert_eq!(r.state(), LifecycleState::Destroyed);
        assert!(r.context().live_objects().is_empty());
    }

    #[test]
    fn failed_recovery_during_acquire_still_allows_cleanup() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_acquire(2, Scripted::OutOfDate);
        ctx.script_acquire(3, Scripted::Fatal);
        let mut r = prepared(ctx);
        r.run_frame().unwrap();
        assert!(r.run_frame().is_err());
        assert_eq!(r.context().count(|c| matches!(c, Call::SubmitDraw { .. })), 1);

        r.cleanup().unwrap();
        assert!(r.context().live_objects().is_empty());
    }

    #[test]
    fn fatal_present_is_returned_after_advancing() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.script_present(1, Scripted::Fatal);
        let mut r = prepared(ctx);
        assert!(r.run_frame().is_err());
        assert_eq!(r.context().count(|c| *c == Call::AdvanceFrame), 1);
    }

    #[test]
    fn each_frame_writes_mvp_to_acquired_image() {
        let mut r = prepared(ScriptedContext::single_queue(3, SQUARE));
        run(&mut r, 4);
        let writes: Vec<_> = r
            .context()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::WriteUniform { image, len } => Some((*image, *len)),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![(0, 64), (1, 64), (2, 64), (0, 64)]);
    }

    #[test]
    fn frame_slot_advances_once_per_present() {
        let mut r = prepared(ScriptedContext::single_queue(3, SQUARE));
        run(&mut r, 7);
        let ctx = r.context();
        assert_eq!(ctx.count(|c| *c == Call::AdvanceFrame), ctx.presents().len());
    }

    #[test]
    fn paused_session_does_not_draw() {
        let mut r = prepared(ScriptedContext::single_queue(2, SQUARE));
        r.handle_key(DemoKey::Space);
        run(&mut r, 3);
        assert_eq!(r.context().count(|c| *c == Call::Acquire), 0);
        assert_eq!(r.session().cur_frame(), 0);
    }

    #[test]
    fn frame_budget_stops_drawing() {
        let config = StartupConfig {
            frame_count: Some(5),
            ..StartupConfig::default()
        };
        let mut r = CubeRenderer::new(ScriptedContext::single_queue(2, SQUARE), config);
        r.prepare().unwrap();
        run(&mut r, 8);
        assert!(r.should_quit());
        assert_eq!(r.session().cur_frame(), 5);
        assert_eq!(r.context().presents().len(), 5);
    }

    #[test]
    fn incremental_present_attaches_damage() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.features.incremental_present = true;
        let mut r = prepared(ctx);
        run(&mut r, 1);
        assert_eq!(r.context().presents()[0].damage, Some(damage_rect(SQUARE)));
    }

    #[test]
    fn display_timing_schedules_presents() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.features.display_timing = true;
        let mut r = prepared(ctx);
        run(&mut r, 3);

        let times: Vec<_> = r
            .context()
            .presents()
            .iter()
            .map(|p| p.timing.unwrap())
            .collect();
        let ipd = 16_666_667;
        assert_eq!(times[0].present_id, 1);
        assert_eq!(times[0].desired_present_time, 1_000_000_000 + ipd / 2);
        assert_eq!(times[2].present_id, 3);
        assert_eq!(times[2].desired_present_time, times[0].desired_present_time + 2 * ipd);
    }

    #[test]
    fn first_timing_sample_only_syncs() {
        let mut ctx = ScriptedContext::single_queue(2, SQUARE);
        ctx.features.display_timing = true;
        let mut r = prepared(ctx);
        run(&mut r, 3);

        let desired = r.context().presents()[0].timing.unwrap().desired_present_time;
        r.context_mut().queue_timings(vec![PastPresentationTiming {
            present_id: 1,
            desired_present_time: desired,
            actual_present_time: desired + 40_000_000,
            earliest_present_time: desired + 40_000_000,
            present_margin: 0,
        }]);
        run(&mut r, 1);

        let timer = r.session().timer().unwrap();
        assert!(timer.is_synced());
        assert_eq!(timer.last_late_id(), 3);
        assert_eq!(timer.last_early_id(), 0);
        assert_eq!(timer.multiplier(), 1);
    }
}

// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use vkcube_core::{default_level, init_tracing};
use vkcube_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};
use vkcube_platform::PlatformWindow;
use vkcube_render::{CubeRenderer, DemoKey, RenderSize, Renderer, StartupConfig};
use vkcube_render_vk::VkContext;

mod config;

use config::{Args, CONFIG_FILE};

fn demo_key(code: KeyCode) -> Option<DemoKey> {
    match code {
        KeyCode::ArrowLeft => Some(DemoKey::Left),
        KeyCode::ArrowRight => Some(DemoKey::Right),
        KeyCode::Space => Some(DemoKey::Space),
        KeyCode::Escape => Some(DemoKey::Escape),
        _ => None,
    }
}

struct App {
    config: StartupConfig,
    window: Option<Arc<Window>>,
    renderer: Option<CubeRenderer<VkContext>>,
    failed: bool,
    exiting: bool,
}

impl App {
    fn new(config: StartupConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            failed: false,
            exiting: false,
        }
    }

    // STRICT ORDER: window -> Vulkan context on it -> renderer -> prepare.
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let size = self.config.size;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("vkcube")
                    .with_inner_size(PhysicalSize::new(size.width, size.height)),
            )
            .context("create_window")?;
        let window = Arc::new(window);

        let platform: Arc<dyn PlatformWindow> = window.clone();
        let ctx = VkContext::new(platform, &self.config).context("vulkan init")?;
        let mut renderer = CubeRenderer::new(ctx, self.config.clone());
        renderer.prepare().context("prepare")?;

        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.cleanup() {
                error!("cleanup failed: {e:#}");
                self.failed = true;
            }
        }
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.failed = true;
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() || self.exiting {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                debug!("Resized -> {}x{}", size.width, size.height);
                let res = match self.renderer.as_mut() {
                    Some(r) => Renderer::resize(r, size),
                    None => Ok(()),
                };
                if let Err(e) = res {
                    self.fail(event_loop, e.context("resize"));
                } else if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() {
                    return;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                // Held Space would toggle pause on every repeat.
                if event.repeat && code == KeyCode::Space {
                    return;
                }
                if let (Some(key), Some(r)) = (demo_key(code), self.renderer.as_mut()) {
                    r.handle_key(key);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                let res = renderer.render();
                let quit = renderer.should_quit();
                match res {
                    Err(e) => self.fail(event_loop, e.context("draw")),
                    Ok(()) if quit => {
                        info!("quit requested");
                        self.shutdown(event_loop);
                    }
                    Ok(()) => {
                        if let Some(w) = &self.window {
                            w.request_redraw();
                        }
                    }
                }
            }

            _ => {}
        }
    }
}

fn run(config: StartupConfig) -> Result<bool> {
    let event_loop: EventLoop<()> = EventLoop::new().context("EventLoop::new")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("run_app")?;
    Ok(!app.failed)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(config::parse_exit_status(&e));
        }
    };
    init_tracing(default_level(args.validate || args.validate_checks_disabled));

    let file = config::load_file(Path::new(CONFIG_FILE));
    let startup = config::merge(&file, &args);
    info!(
        "vkcube {}x{}, present mode {:?}, textured={}",
        startup.size.width, startup.size.height, startup.present_mode, startup.textured
    );
    if startup.suppress_popups {
        debug!("--suppress_popups: errors are only logged");
    }

    match run(startup) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

// SPDX-License-Identifier: CEPL-1.0
use vkcube_math::{CubeScene, Mat4};

use crate::config::StartupConfig;
use crate::timing::PresentTimer;

/// Keys the demo reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoKey {
    Left,
    Right,
    Space,
    Escape,
}

/// Mutable state carried from frame to frame.
#[derive(Clone, Debug)]
pub struct FrameSession {
    pub(crate) current_buffer: u32,
    spin_angle: f32,
    spin_increment: f32,
    pause: bool,
    quit: bool,
    cur_frame: u32,
    frame_count: Option<u32>,
    scene: CubeScene,
    pub(crate) timer: Option<PresentTimer>,
}

impl FrameSession {
    pub fn new(config: &StartupConfig) -> Self {
        Self {
            current_buffer: 0,
            spin_angle: config.spin_angle,
            spin_increment: config.spin_increment,
            pause: false,
            quit: false,
            cur_frame: 0,
            frame_count: config.frame_count,
            scene: CubeScene::new(),
            timer: None,
        }
    }

    pub fn current_buffer(&self) -> u32 {
        self.current_buffer
    }
    pub fn spin_angle(&self) -> f32 {
        self.spin_angle
    }
    pub fn is_paused(&self) -> bool {
        self.pause
    }
    pub fn should_quit(&self) -> bool {
        self.quit
    }
    pub fn cur_frame(&self) -> u32 {
        self.cur_frame
    }
    pub fn scene(&self) -> &CubeScene {
        &self.scene
    }
    pub fn timer(&self) -> Option<&PresentTimer> {
        self.timer.as_ref()
    }

    pub fn handle_key(&mut self, key: DemoKey) {
        match key {
            DemoKey::Left => self.spin_angle -= self.spin_increment,
            DemoKey::Right => self.spin_angle += self.spin_increment,
            DemoKey::Space => self.pause = !self.pause,
            DemoKey::Escape => self.quit = true,
        }
    }

    /// Advance the model rotation by one frame's worth of spin.
    pub(crate) fn spin(&mut self) -> Mat4 {
        self.scene.spin(self.spin_angle)
    }

    /// Count a drawn frame; flips `quit` when the frame budget is used up.
    pub(crate) fn finish_frame(&mut self) {
        self.cur_frame += 1;
        if self.frame_count == Some(self.cur_frame) {
            self.quit = true;
        }
    }
}

// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePref {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
    FifoRelaxed,
}

/// Per-run settings. Fixed once the renderer is built.
#[derive(Clone, Debug)]
pub struct StartupConfig {
    pub size: RenderSize,
    /// Stop after this many drawn frames. `None` runs until quit.
    pub frame_count: Option<u32>,
    pub validate: bool,
    pub validate_checks_disabled: bool,
    pub use_break: bool,
    pub use_staging: bool,
    pub textured: bool,
    pub incremental_present: bool,
    pub display_timing: bool,
    pub gpu_number: Option<usize>,
    pub force_errors: bool,
    pub suppress_popups: bool,
    pub present_mode: PresentModePref,
    pub clear_color: [f32; 4],
    pub spin_angle: f32,
    pub spin_increment: f32,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            size: RenderSize {
                width: 500,
                height: 500,
            },
            frame_count: None,
            validate: false,
            validate_checks_disabled: false,
            use_break: false,
            use_staging: false,
            textured: true,
            incremental_present: false,
            display_timing: false,
            gpu_number: None,
            force_errors: false,
            suppress_popups: false,
            present_mode: PresentModePref::Fifo,
            clear_color: [0.2, 0.2, 0.2, 0.2],
            spin_angle: 4.0,
            spin_increment: 0.2,
        }
    }
}

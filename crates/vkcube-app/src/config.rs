// SPDX-License-Identifier: CEPL-1.0
//! Startup settings: built-in defaults, then `vkcube.toml`, then the command
//! line.
use std::{fs, io, path::Path};

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::{debug, warn};
use vkcube_render::{PresentModePref, RenderSize, StartupConfig};

pub const CONFIG_FILE: &str = "vkcube.toml";

#[derive(Parser, Debug, Default)]
#[command(name = "vkcube", version, about = "Spinning textured cube on Vulkan", long_about = None)]
pub struct Args {
    /// Upload the texture through a staging buffer
    #[arg(long = "use_staging")]
    pub use_staging: bool,
    /// Abort on the first validation error
    #[arg(long = "break")]
    pub use_break: bool,
    /// Enable the Khronos validation layer
    #[arg(long)]
    pub validate: bool,
    /// Validation layer with every check disabled
    #[arg(long = "validate-checks-disabled")]
    pub validate_checks_disabled: bool,
    /// Quit after this many frames
    #[arg(long = "c", value_name = "framecount")]
    pub frame_count: Option<u32>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: Option<u32>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: Option<u32>,
    /// Accepted for compatibility; there are no popups
    #[arg(long = "suppress_popups")]
    pub suppress_popups: bool,
    /// Schedule presents with VK_GOOGLE_display_timing
    #[arg(long = "display_timing")]
    pub display_timing: bool,
    /// Attach damage regions with VK_KHR_incremental_present
    #[arg(long = "incremental_present")]
    pub incremental_present: bool,
    /// Physical device index instead of automatic selection
    #[arg(long = "gpu_number", value_name = "index")]
    pub gpu_number: Option<usize>,
    /// Deliberately provoke a validation error
    #[arg(long = "force_errors")]
    pub force_errors: bool,
    /// Preferred present mode; FIFO when unavailable
    #[arg(long = "present_mode", value_enum)]
    pub present_mode: Option<PresentModeArg>,
    /// Draw the cube without a texture
    #[arg(long = "no_texture")]
    pub no_texture: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeArg {
    Fifo,
    Mailbox,
    Immediate,
    #[value(name = "fifo_relaxed")]
    FifoRelaxed,
}

impl From<PresentModeArg> for PresentModePref {
    fn from(m: PresentModeArg) -> Self {
        match m {
            PresentModeArg::Fifo => PresentModePref::Fifo,
            PresentModeArg::Mailbox => PresentModePref::Mailbox,
            PresentModeArg::Immediate => PresentModePref::Immediate,
            PresentModeArg::FifoRelaxed => PresentModePref::FifoRelaxed,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowCfg {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderCfg {
    pub present_mode: Option<PresentModeArg>,
    pub clear_color: Option<[f32; 4]>,
    pub spin_angle: Option<f32>,
    pub spin_increment: Option<f32>,
    pub textured: Option<bool>,
    pub use_staging: Option<bool>,
    pub incremental_present: Option<bool>,
    pub display_timing: Option<bool>,
    pub frame_count: Option<u32>,
    pub gpu_number: Option<usize>,
}

pub fn parse_file(text: &str) -> Result<FileCfg, toml::de::Error> {
    toml::from_str(text)
}

/// A missing file is silent; an unreadable or malformed one falls back to
/// defaults with a warning.
pub fn load_file(path: &Path) -> FileCfg {
    match fs::read_to_string(path) {
        Ok(text) => parse_file(&text).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            FileCfg::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no {}, using defaults", path.display());
            FileCfg::default()
        }
        Err(e) => {
            warn!("{}: {e}; using defaults", path.display());
            FileCfg::default()
        }
    }
}

fn positive(v: Option<u32>, what: &str) -> Option<u32> {
    match v {
        Some(0) => {
            warn!("{CONFIG_FILE}: {what} must be > 0, ignored");
            None
        }
        other => other,
    }
}

/// Defaults < file < command line.
pub fn merge(file: &FileCfg, args: &Args) -> StartupConfig {
    let d = StartupConfig::default();
    let r = &file.render;

    let width = args
        .width
        .or(positive(file.window.width, "window.width"))
        .unwrap_or(d.size.width);
    let height = args
        .height
        .or(positive(file.window.height, "window.height"))
        .unwrap_or(d.size.height);

    StartupConfig {
        size: RenderSize { width, height },
        frame_count: args.frame_count.or(r.frame_count).or(d.frame_count),
        validate: args.validate || args.validate_checks_disabled,
        validate_checks_disabled: args.validate_checks_disabled,
        use_break: args.use_break,
        use_staging: args.use_staging || r.use_staging.unwrap_or(d.use_staging),
        textured: !args.no_texture && r.textured.unwrap_or(d.textured),
        incremental_present: args.incremental_present
            || r.incremental_present.unwrap_or(d.incremental_present),
        display_timing: args.display_timing || r.display_timing.unwrap_or(d.display_timing),
        gpu_number: args.gpu_number.or(r.gpu_number).or(d.gpu_number),
        force_errors: args.force_errors,
        suppress_popups: args.suppress_popups,
        present_mode: args
            .present_mode
            .or(r.present_mode)
            .map_or(d.present_mode, PresentModePref::from),
        clear_color: r.clear_color.unwrap_or(d.clear_color),
        spin_angle: r.spin_angle.unwrap_or(d.spin_angle),
        spin_increment: r.spin_increment.unwrap_or(d.spin_increment),
    }
}

/// Exit status for a failed parse: 0 for `--help`/`--version`, 1 otherwise.
pub fn parse_exit_status(e: &clap::Error) -> u8 {
    if e.use_stderr() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("vkcube").chain(argv.iter().copied()))
            .expect("valid command line")
    }

    #[test]
    fn underscore_flags_parse() {
        let a = args(&[
            "--use_staging",
            "--break",
            "--c",
            "120",
            "--gpu_number",
            "1",
            "--present_mode",
            "fifo_relaxed",
            "--no_texture",
            "--display_timing",
            "--incremental_present",
            "--suppress_popups",
            "--force_errors",
        ]);
        assert!(a.use_staging && a.use_break && a.no_texture);
        assert!(a.display_timing && a.incremental_present);
        assert!(a.suppress_popups && a.force_errors);
        assert_eq!(a.frame_count, Some(120));
        assert_eq!(a.gpu_number, Some(1));
        assert_eq!(a.present_mode, Some(PresentModeArg::FifoRelaxed));
    }

    #[test]
    fn zero_width_is_rejected_with_status_1() {
        let err = Args::try_parse_from(["vkcube", "--width", "0"]).unwrap_err();
        assert_eq!(parse_exit_status(&err), 1);
    }

    #[test]
    fn unknown_flag_exits_1_and_help_exits_0() {
        let err = Args::try_parse_from(["vkcube", "--bogus"]).unwrap_err();
        assert_eq!(parse_exit_status(&err), 1);
        let help = Args::try_parse_from(["vkcube", "--help"]).unwrap_err();
        assert_eq!(parse_exit_status(&help), 0);
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = merge(&FileCfg::default(), &Args::default());
        assert_eq!(cfg.size, RenderSize { width: 500, height: 500 });
        assert!(cfg.textured);
        assert!(!cfg.validate);
        assert_eq!(cfg.present_mode, PresentModePref::Fifo);
        assert_eq!(cfg.frame_count, None);
    }

    #[test]
    fn command_line_beats_file() {
        let file = parse_file(
            r#"
            [window]
            width = 800
            height = 600

            [render]
            present_mode = "mailbox"
            spin_increment = 1.5
            "#,
        )
        .unwrap();
        let cfg = merge(&file, &args(&["--width", "320", "--present_mode", "immediate"]));
        assert_eq!(cfg.size, RenderSize { width: 320, height: 600 });
        assert_eq!(cfg.present_mode, PresentModePref::Immediate);
        assert_eq!(cfg.spin_increment, 1.5);
    }

    #[test]
    fn no_texture_overrides_file() {
        let file = parse_file("[render]\ntextured = true\n").unwrap();
        assert!(!merge(&file, &args(&["--no_texture"])).textured);
    }

    #[test]
    fn checks_disabled_implies_validation() {
        let cfg = merge(&FileCfg::default(), &args(&["--validate-checks-disabled"]));
        assert!(cfg.validate && cfg.validate_checks_disabled);
    }

    #[test]
    fn zero_size_in_file_is_ignored() {
        let file = parse_file("[window]\nwidth = 0\n").unwrap();
        assert_eq!(merge(&file, &Args::default()).size.width, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse_file("[render]\npresent_mode = \"vsync\"\n").is_err());
        assert!(parse_file("[render]\nnonsense = 1\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_file(Path::new("/nonexistent/vkcube.toml"));
        assert!(cfg.render.present_mode.is_none());
        assert!(cfg.window.width.is_none());
    }
}

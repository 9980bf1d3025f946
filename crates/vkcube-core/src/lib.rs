// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing::Level;

/// Install the process-wide subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: Level) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_ascii_lowercase()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// `debug` while validating, `info` otherwise.
pub fn default_level(validate: bool) -> Level {
    if validate {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

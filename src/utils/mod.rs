//! Utility functions for the reflow pipeline.
//!
//! This module provides the logging setup shared by the binaries and the
//! page-image cropping helpers used for tables, figures and position tags.

pub mod crop;

pub use crop::{crop_pixels, crop_region, crop_tagged, stack_vertically};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Calling it more than once is harmless; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

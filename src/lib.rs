// repatch - checked, idempotent textual patches for web application sources

pub mod commands;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod patch;
pub mod utils;

pub use error::{RepatchError, RepatchResult};

use anyhow::Result;
use tracing::debug;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Initialize logging on stderr so stdout stays clean for reports and diffs.
///
/// `RUST_LOG` wins when set; otherwise `repatch=info`, or `repatch=debug`
/// when `verbose`.
pub fn init_with_logger(verbose: bool, ansi_colors: bool) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "repatch=debug" } else { "repatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt::Subscriber::builder()
        .with_ansi(ansi_colors)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(verbose)
        .without_time()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    debug!("Initializing repatch v{}", version());
    Ok(())
}

#[allow(clippy::module_inception)]
pub mod config;
pub mod config_loader;

pub use config::RepatchConfig;
pub use config_loader::{apply_env, apply_overrides, ConfigLoader, ConfigOverrides};

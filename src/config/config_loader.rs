use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::config::RepatchConfig;
use crate::error::{RepatchError, RepatchResult};

pub const DEFAULT_CONFIG_FILE: &str = "repatch.toml";

pub const ENV_ROOT: &str = "REPATCH_ROOT";
pub const ENV_PATCHES_DIR: &str = "REPATCH_PATCHES_DIR";
pub const ENV_CHECKPOINT_DIR: &str = "REPATCH_CHECKPOINT_DIR";

/// Values given on the command line; they win over file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub patches_dir: Option<PathBuf>,
    pub no_checkpoints: bool,
}

/// Builds a `RepatchConfig` from defaults, a TOML file and the environment
pub struct ConfigLoader {
    config_path: PathBuf,
    /// The path was named explicitly, so it must exist
    explicit: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }

    /// Set a custom config path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            explicit: true,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load file and process environment
    pub fn load(&self) -> RepatchResult<RepatchConfig> {
        let mut config = self.load_file()?;
        apply_env(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file(&self) -> RepatchResult<RepatchConfig> {
        if !self.config_path.exists() {
            if self.explicit {
                return Err(RepatchError::config_error(format!(
                    "config file not found: {}",
                    self.config_path.display()
                )));
            }
            debug!("No {} found, using defaults", self.config_path.display());
            return Ok(RepatchConfig::default());
        }

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| RepatchError::io_error(e, Some(&self.config_path)))?;
        let config: RepatchConfig = toml::from_str(&content).map_err(|e| {
            RepatchError::config_error(format!("{}: {}", self.config_path.display(), e))
        })?;

        info!("Loaded configuration from {}", self.config_path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `REPATCH_*` variables through `lookup`
pub fn apply_env(config: &mut RepatchConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(root) = non_empty(ENV_ROOT) {
        debug!("{} overrides root: {}", ENV_ROOT, root);
        config.root = PathBuf::from(root);
    }
    if let Some(dir) = non_empty(ENV_PATCHES_DIR) {
        config.patches_dir = PathBuf::from(dir);
    }
    if let Some(dir) = non_empty(ENV_CHECKPOINT_DIR) {
        config.checkpoint_dir = PathBuf::from(dir);
    }
}

pub fn apply_overrides(config: &mut RepatchConfig, overrides: &ConfigOverrides) {
    if let Some(root) = &overrides.root {
        config.root = root.clone();
    }
    if let Some(dir) = &overrides.patches_dir {
        config.patches_dir = dir.clone();
    }
    if overrides.no_checkpoints {
        config.checkpoints = false;
    }
}

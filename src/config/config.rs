use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::paths::expand_tilde;

/// Settings shared by every command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepatchConfig {
    /// Directory the patch targets are relative to
    pub root: PathBuf,

    /// Directory holding patch files
    pub patches_dir: PathBuf,

    /// Where checkpoints are stored, relative to `root` unless absolute
    pub checkpoint_dir: PathBuf,

    /// Record a checkpoint before each write
    pub checkpoints: bool,

    /// Accept absolute targets and targets outside `root`
    pub allow_outside_root: bool,

    /// Context lines in rendered diffs
    pub diff_context: usize,
}

impl Default for RepatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            patches_dir: PathBuf::from("patches"),
            checkpoint_dir: PathBuf::from(".repatch/checkpoints"),
            checkpoints: true,
            allow_outside_root: false,
            diff_context: 3,
        }
    }
}

impl RepatchConfig {
    pub fn root(&self) -> PathBuf {
        expand_tilde(&self.root)
    }

    pub fn patches_dir(&self) -> PathBuf {
        expand_tilde(&self.patches_dir)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        let dir = expand_tilde(&self.checkpoint_dir);
        if dir.is_absolute() {
            dir
        } else {
            self.root().join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepatchConfig::default();
        assert_eq!(config.patches_dir(), PathBuf::from("patches"));
        assert_eq!(config.checkpoint_dir(), PathBuf::from("./.repatch/checkpoints"));
        assert!(config.checkpoints);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RepatchConfig = toml::from_str("root = \"/srv/scheduler\"\ncheckpoints = false\n").unwrap();
        assert_eq!(config.root(), PathBuf::from("/srv/scheduler"));
        assert_eq!(
            config.checkpoint_dir(),
            PathBuf::from("/srv/scheduler/.repatch/checkpoints")
        );
        assert!(!config.checkpoints);
        assert_eq!(config.diff_context, 3);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<RepatchConfig>("rooot = \"x\"\n").is_err());
    }
}

pub mod apply;
pub mod checkpoints;
pub mod list;

pub use apply::{apply_patches, check_patches, ApplyOptions, PatchResult, PatchRun, RunReport};
pub use checkpoints::{list_checkpoints, revert_checkpoint, RevertTarget};
pub use list::list_patches;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::RepatchConfig;
use crate::error::RepatchResult;
use crate::patch::PatchSpec;
use crate::utils::{read_text, resolve_target};

/// Resolved configuration for one command invocation
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: RepatchConfig,
    pub root: PathBuf,
    pub patches_dir: PathBuf,
}

impl Workspace {
    pub fn new(config: RepatchConfig) -> Self {
        let root = config.root();
        let patches_dir = config.patches_dir();
        Self {
            config,
            root,
            patches_dir,
        }
    }

    pub fn target_path(&self, spec: &PatchSpec) -> RepatchResult<PathBuf> {
        resolve_target(&self.root, &spec.target, self.config.allow_outside_root)
    }

    /// Path shown to the user: relative to root when possible
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// File contents as earlier patches in the same run left them.
///
/// Dry runs never write, so later patches must see earlier results here
/// rather than on disk.
#[derive(Debug, Default)]
pub(crate) struct Overlay {
    files: HashMap<PathBuf, String>,
}

impl Overlay {
    pub(crate) async fn read(&self, path: &Path) -> RepatchResult<String> {
        match self.files.get(path) {
            Some(content) => Ok(content.clone()),
            None => read_text(path).await,
        }
    }

    pub(crate) fn set(&mut self, path: PathBuf, content: String) {
        self.files.insert(path, content);
    }
}

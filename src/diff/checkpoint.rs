use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{map_io_err, RepatchError, RepatchResult};
use crate::utils::fs::{calculate_string_hash, write_atomic};

/// Contents of one target file before and after a patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Absolute path of the target when the patch was applied
    pub file_path: PathBuf,

    pub hash_before: String,
    pub hash_after: String,

    pub content_before: String,
    pub content_after: String,
}

impl FileChange {
    pub fn new(file_path: impl Into<PathBuf>, content_before: &str, content_after: &str) -> Self {
        Self {
            file_path: file_path.into(),
            hash_before: calculate_string_hash(content_before),
            hash_after: calculate_string_hash(content_after),
            content_before: content_before.to_string(),
            content_after: content_after.to_string(),
        }
    }
}

/// A record of one applied patch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Name of the patch that produced the change
    pub patch: String,
    pub change: FileChange,
}

/// What a restore did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// The file already holds the "before" contents
    AlreadyRestored,
}

/// Stores checkpoints as one JSON file each
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    checkpoints: HashMap<String, Checkpoint>,
}

impl CheckpointManager {
    /// Open (creating if needed) the checkpoint directory and load what is there
    pub async fn new(checkpoint_dir: impl AsRef<Path>) -> RepatchResult<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        fs::create_dir_all(&checkpoint_dir)
            .await
            .map_err(map_io_err(&checkpoint_dir))?;

        let mut manager = Self {
            checkpoint_dir,
            checkpoints: HashMap::new(),
        };
        manager.load_checkpoints().await?;

        Ok(manager)
    }

    async fn load_checkpoints(&mut self) -> RepatchResult<()> {
        let mut entries = fs::read_dir(&self.checkpoint_dir)
            .await
            .map_err(map_io_err(&self.checkpoint_dir))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(map_io_err(&self.checkpoint_dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_checkpoint(&path).await {
                Ok(checkpoint) => {
                    self.checkpoints.insert(checkpoint.id.clone(), checkpoint);
                }
                Err(e) => {
                    warn!("Failed to load checkpoint {}: {}", path.display(), e);
                }
            }
        }

        debug!("Loaded {} checkpoints", self.checkpoints.len());
        Ok(())
    }

    async fn read_checkpoint(path: &Path) -> RepatchResult<Checkpoint> {
        let content = fs::read_to_string(path).await.map_err(map_io_err(path))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn file_for(&self, id: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{}.json", id))
    }

    /// Record a change and return the new checkpoint's id
    pub async fn create_checkpoint(&mut self, patch: &str, change: FileChange) -> RepatchResult<String> {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            patch: patch.to_string(),
            change,
        };

        let path = self.file_for(&checkpoint.id);
        let json = serde_json::to_string_pretty(&checkpoint)?;
        fs::write(&path, json).await.map_err(map_io_err(&path))?;

        info!("Created checkpoint {} for {}", checkpoint.id, patch);
        let id = checkpoint.id.clone();
        self.checkpoints.insert(id.clone(), checkpoint);
        Ok(id)
    }

    /// All checkpoints, oldest first
    pub fn list_checkpoints(&self) -> Vec<&Checkpoint> {
        let mut all: Vec<&Checkpoint> = self.checkpoints.values().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Look up by full id or unique id prefix
    pub fn get_checkpoint(&self, id: &str) -> RepatchResult<&Checkpoint> {
        if let Some(checkpoint) = self.checkpoints.get(id) {
            return Ok(checkpoint);
        }

        let mut hits = self.checkpoints.values().filter(|c| c.id.starts_with(id));
        match (hits.next(), hits.next()) {
            (Some(checkpoint), None) if !id.is_empty() => Ok(checkpoint),
            _ => Err(RepatchError::checkpoint_not_found(id)),
        }
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.list_checkpoints().pop()
    }

    /// Write a checkpoint's "before" contents back.
    ///
    /// Refuses when the file no longer holds the "after" contents, unless
    /// `force` is set.
    pub async fn restore_checkpoint(&self, id: &str, force: bool) -> RepatchResult<RestoreOutcome> {
        let checkpoint = self.get_checkpoint(id)?;
        let change = &checkpoint.change;
        let path = &change.file_path;

        let current = match fs::read_to_string(path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RepatchError::io_error(e, Some(path))),
        };
        let current_hash = current.as_deref().map(calculate_string_hash);

        if current_hash.as_deref() == Some(change.hash_before.as_str()) {
            info!("{} already holds checkpoint {} contents", path.display(), checkpoint.id);
            return Ok(RestoreOutcome::AlreadyRestored);
        }

        if current_hash.as_deref() != Some(change.hash_after.as_str()) && !force {
            return Err(RepatchError::checkpoint_conflict(&checkpoint.id, path));
        }

        write_atomic(path, &change.content_before, None)?;
        info!("Restored {} from checkpoint {}", path.display(), checkpoint.id);
        Ok(RestoreOutcome::Restored)
    }

    pub async fn delete_checkpoint(&mut self, id: &str) -> RepatchResult<()> {
        let id = self.get_checkpoint(id)?.id.clone();
        let path = self.file_for(&id);
        fs::remove_file(&path).await.map_err(map_io_err(&path))?;
        self.checkpoints.remove(&id);

        info!("Deleted checkpoint: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_reload_and_restore() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("styles.css");
        std::fs::write(&target, "after\n").unwrap();

        let store = dir.path().join(".repatch/checkpoints");
        let mut manager = CheckpointManager::new(&store).await.unwrap();
        let id = manager
            .create_checkpoint("append-modal-css", FileChange::new(&target, "before\n", "after\n"))
            .await
            .unwrap();

        // A fresh manager sees the stored checkpoint
        let reloaded = CheckpointManager::new(&store).await.unwrap();
        assert_eq!(reloaded.list_checkpoints().len(), 1);
        assert_eq!(reloaded.latest().unwrap().patch, "append-modal-css");
        assert_eq!(reloaded.get_checkpoint(&id[..8]).unwrap().id, id);

        assert_eq!(
            reloaded.restore_checkpoint(&id, false).await.unwrap(),
            RestoreOutcome::Restored
        );
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "before\n");
        assert_eq!(
            reloaded.restore_checkpoint(&id, false).await.unwrap(),
            RestoreOutcome::AlreadyRestored
        );
    }

    #[tokio::test]
    async fn test_restore_refuses_on_conflict() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("app.js");
        std::fs::write(&target, "edited by hand\n").unwrap();

        let mut manager = CheckpointManager::new(dir.path().join("cp")).await.unwrap();
        let id = manager
            .create_checkpoint("fix-item-id", FileChange::new(&target, "before\n", "after\n"))
            .await
            .unwrap();

        let err = manager.restore_checkpoint(&id, false).await.unwrap_err();
        assert!(matches!(err, RepatchError::CheckpointConflict { .. }));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "edited by hand\n");

        manager.restore_checkpoint(&id, true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "before\n");

        manager.delete_checkpoint(&id).await.unwrap();
        assert!(manager.get_checkpoint(&id).is_err());
    }
}

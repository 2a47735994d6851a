use std::fmt::Write as _;

use super::Workspace;
use crate::diff::{CheckpointManager, RestoreOutcome};
use crate::error::{RepatchError, RepatchResult};

/// Which checkpoint `revert` restores
#[derive(Debug, Clone)]
pub enum RevertTarget {
    Id(String),
    Latest,
}

/// Table of stored checkpoints, oldest first
pub async fn list_checkpoints(workspace: &Workspace) -> RepatchResult<String> {
    let manager = CheckpointManager::new(workspace.config.checkpoint_dir()).await?;
    let checkpoints = manager.list_checkpoints();
    if checkpoints.is_empty() {
        return Ok("No checkpoints.\n".to_string());
    }

    let mut out = String::new();
    for checkpoint in checkpoints {
        let _ = writeln!(
            out,
            "{}  {}  {:<28} {}",
            short_id(&checkpoint.id),
            checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S"),
            checkpoint.patch,
            workspace.display_path(&checkpoint.change.file_path).display()
        );
    }
    Ok(out)
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Restore the "before" contents recorded by a checkpoint
pub async fn revert_checkpoint(
    workspace: &Workspace,
    target: RevertTarget,
    force: bool,
) -> RepatchResult<String> {
    let manager = CheckpointManager::new(workspace.config.checkpoint_dir()).await?;

    let id = match target {
        RevertTarget::Id(id) => manager.get_checkpoint(&id)?.id.clone(),
        RevertTarget::Latest => manager
            .latest()
            .map(|c| c.id.clone())
            .ok_or_else(|| RepatchError::checkpoint_not_found("latest"))?,
    };

    let checkpoint = manager.get_checkpoint(&id)?;
    let path = workspace.display_path(&checkpoint.change.file_path).display().to_string();

    Ok(match manager.restore_checkpoint(&id, force).await? {
        RestoreOutcome::Restored => format!("Reverted {} on {}", checkpoint.patch, path),
        RestoreOutcome::AlreadyRestored => format!("{} already reverted on {}", checkpoint.patch, path),
    })
}

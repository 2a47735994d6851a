use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::{Overlay, Workspace};
use crate::diff::{diff_stat, render_unified, CheckpointManager, DiffStat, FileChange};
use crate::engine::{apply_patch, PatchStatus, StepReport};
use crate::error::{RepatchError, RepatchResult};
use crate::patch::{select_patches, PatchSpec};
use crate::utils::{calculate_string_hash, write_atomic};

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Evaluate and render diffs, write nothing
    pub dry_run: bool,
    /// Continue with the next patch after a failure
    pub keep_going: bool,
}

/// How one patch ended
#[derive(Debug)]
pub enum PatchResult {
    Written {
        checkpoint: Option<String>,
        stat: DiffStat,
    },
    /// Dry run or check: the target would change
    Pending { diff: String, stat: DiffStat },
    AlreadyApplied,
    /// Nothing changed because every step was skipped
    Unmatched,
    Failed(RepatchError),
}

#[derive(Debug)]
pub struct PatchRun {
    pub name: String,
    pub target: PathBuf,
    pub message: Option<String>,
    pub steps: Vec<StepReport>,
    pub result: PatchResult,
}

impl PatchRun {
    pub fn failed(&self) -> bool {
        matches!(self.result, PatchResult::Failed(_))
    }

    /// One line for the terminal
    pub fn summary(&self) -> String {
        let target = self.target.display();
        match &self.result {
            PatchResult::Written { stat, .. } => match &self.message {
                Some(message) => message.clone(),
                None => format!("{}: patched {} (+{} -{})", self.name, target, stat.inserted, stat.deleted),
            },
            PatchResult::Pending { stat, .. } => {
                format!("{}: would patch {} (+{} -{})", self.name, target, stat.inserted, stat.deleted)
            }
            PatchResult::AlreadyApplied => format!("{}: already applied to {}", self.name, target),
            PatchResult::Unmatched => format!("{}: no anchors matched in {}", self.name, target),
            PatchResult::Failed(e) => format!("{}: FAILED: {}", self.name, e),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub runs: Vec<PatchRun>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.runs.iter().filter(|r| r.failed()).count()
    }

    pub fn render(&self, with_diffs: bool, verbose: bool) -> String {
        let mut out = String::new();
        for run in &self.runs {
            if with_diffs {
                if let PatchResult::Pending { diff, .. } = &run.result {
                    out.push_str(diff);
                }
            }
            let _ = writeln!(out, "{}", run.summary());
            if verbose {
                for step in &run.steps {
                    let _ = writeln!(out, "    {}", step);
                }
            }
        }
        out
    }
}

/// Apply the selected patches (all when `selectors` is empty) in file order
pub async fn apply_patches(
    workspace: &Workspace,
    selectors: &[String],
    options: ApplyOptions,
) -> RepatchResult<RunReport> {
    let patches = select_patches(&workspace.patches_dir, selectors)?;
    let mut overlay = Overlay::default();
    let mut checkpoints: Option<CheckpointManager> = None;
    let mut report = RunReport::default();

    for (_, spec) in &patches {
        let run = run_patch(workspace, spec, options, &mut overlay, &mut checkpoints).await;
        let failed = run.failed();
        match &run.result {
            PatchResult::Failed(e) => error!(kind = e.kind(), "Patch {} failed: {}", spec.name, e),
            _ => info!("{}", run.summary()),
        }
        report.runs.push(run);

        if failed && !options.keep_going {
            warn!("Stopping after failed patch {}", spec.name);
            break;
        }
    }

    Ok(report)
}

/// Evaluate every selected patch without writing
pub async fn check_patches(workspace: &Workspace, selectors: &[String]) -> RepatchResult<RunReport> {
    let options = ApplyOptions {
        dry_run: true,
        keep_going: true,
    };
    apply_patches(workspace, selectors, options).await
}

async fn run_patch(
    workspace: &Workspace,
    spec: &PatchSpec,
    options: ApplyOptions,
    overlay: &mut Overlay,
    checkpoints: &mut Option<CheckpointManager>,
) -> PatchRun {
    let mut run = PatchRun {
        name: spec.name.clone(),
        target: spec.target.clone(),
        message: spec.message.clone(),
        steps: Vec::new(),
        result: PatchResult::AlreadyApplied,
    };

    run.result = match try_run_patch(workspace, spec, options, overlay, checkpoints, &mut run.steps).await {
        Ok(result) => result,
        Err(e) => PatchResult::Failed(e),
    };
    run
}

async fn try_run_patch(
    workspace: &Workspace,
    spec: &PatchSpec,
    options: ApplyOptions,
    overlay: &mut Overlay,
    checkpoints: &mut Option<CheckpointManager>,
    steps: &mut Vec<StepReport>,
) -> RepatchResult<PatchResult> {
    let path = workspace.target_path(spec)?;
    let before = overlay.read(&path).await?;

    let outcome = apply_patch(&before, spec)?;
    for warning in &outcome.warnings {
        warn!("Patch {}: {}", spec.name, warning);
    }
    *steps = outcome.steps.clone();

    match outcome.status() {
        PatchStatus::AlreadyApplied => return Ok(PatchResult::AlreadyApplied),
        PatchStatus::Unmatched => return Ok(PatchResult::Unmatched),
        PatchStatus::Changed => {}
    }

    let after = outcome.content;
    let stat = diff_stat(&before, &after);

    if options.dry_run {
        let diff = render_unified(
            workspace.display_path(&path),
            &before,
            &after,
            workspace.config.diff_context,
        );
        overlay.set(path, after);
        return Ok(PatchResult::Pending { diff, stat });
    }

    let checkpoint = if workspace.config.checkpoints {
        if checkpoints.is_none() {
            *checkpoints = Some(CheckpointManager::new(workspace.config.checkpoint_dir()).await?);
        }
        match checkpoints.as_mut() {
            Some(manager) => Some(
                manager
                    .create_checkpoint(&spec.name, FileChange::new(&path, &before, &after))
                    .await?,
            ),
            None => None,
        }
    } else {
        None
    };

    if let Err(e) = write_atomic(&path, &after, Some(&calculate_string_hash(&before))) {
        if let (Some(id), Some(manager)) = (&checkpoint, checkpoints.as_mut()) {
            if let Err(cleanup) = manager.delete_checkpoint(id).await {
                warn!("Failed to drop checkpoint {}: {}", id, cleanup);
            }
        }
        return Err(e);
    }

    overlay.set(path, after);
    Ok(PatchResult::Written { checkpoint, stat })
}

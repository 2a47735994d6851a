//! Applies a patch's edit steps to text held in memory.
//!
//! Nothing here reads or writes files. A patch either produces its full
//! output or fails as a whole, so callers can write the result in one go.

pub mod edit;

pub use edit::{apply_edit, EditEffect};

use std::fmt;
use tracing::{debug, warn};

use crate::diff::search_replace::find_best_match_line;
use crate::error::{RepatchError, RepatchResult};
use crate::patch::{MissingPolicy, PatchSpec};

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Applied { count: usize },
    AlreadyApplied,
    /// Anchor absent under the `skip` policy
    Skipped { anchor: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// 1-based step number
    pub step: usize,
    pub kind: &'static str,
    pub label: Option<String>,
    pub status: StepStatus,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label.as_deref().unwrap_or(self.kind);
        match &self.status {
            StepStatus::Applied { count } => write!(f, "#{} {}: applied ({}x)", self.step, label, count),
            StepStatus::AlreadyApplied => write!(f, "#{} {}: already applied", self.step, label),
            StepStatus::Skipped { .. } => write!(f, "#{} {}: skipped, anchor not found", self.step, label),
        }
    }
}

/// Overall state of a patch after evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    /// The target would change
    Changed,
    /// Every step's result is already in the target
    AlreadyApplied,
    /// No change, and at least one step was skipped
    Unmatched,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStatus::Changed => write!(f, "pending"),
            PatchStatus::AlreadyApplied => write!(f, "applied"),
            PatchStatus::Unmatched => write!(f, "unmatched"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub patch: String,
    pub content: String,
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    /// The patch-level `unless_contains` guard matched
    pub guarded: bool,
    changed: bool,
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn status(&self) -> PatchStatus {
        if self.changed {
            PatchStatus::Changed
        } else if self
            .steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Skipped { .. }))
        {
            PatchStatus::Unmatched
        } else {
            PatchStatus::AlreadyApplied
        }
    }

    pub fn skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Skipped { .. }))
            .count()
    }
}

/// Run every step of `patch` against `content`, in order
pub fn apply_patch(content: &str, patch: &PatchSpec) -> RepatchResult<PatchOutcome> {
    let mut outcome = PatchOutcome {
        patch: patch.name.clone(),
        content: content.to_string(),
        steps: Vec::with_capacity(patch.edits.len()),
        warnings: Vec::new(),
        guarded: false,
        changed: false,
    };

    if let Some(guard) = &patch.unless_contains {
        if content.contains(guard.as_str()) {
            debug!("Patch {} guard matched, nothing to do", patch.name);
            outcome.guarded = true;
            outcome.steps = patch
                .edits
                .iter()
                .enumerate()
                .map(|(idx, step)| StepReport {
                    step: idx + 1,
                    kind: step.edit.kind(),
                    label: step.label.clone(),
                    status: StepStatus::AlreadyApplied,
                })
                .collect();
            return Ok(outcome);
        }
    }

    for (idx, step) in patch.edits.iter().enumerate() {
        let number = idx + 1;

        let status = if step
            .unless_contains
            .as_deref()
            .is_some_and(|guard| outcome.content.contains(guard))
        {
            StepStatus::AlreadyApplied
        } else {
            match apply_edit(&outcome.content, &step.edit)? {
                EditEffect::Applied {
                    content,
                    count,
                    warnings,
                } => {
                    outcome.content = content;
                    outcome.warnings.extend(warnings);
                    StepStatus::Applied { count }
                }
                EditEffect::AlreadyApplied => StepStatus::AlreadyApplied,
                EditEffect::CountMismatch { expected, found } => {
                    return Err(RepatchError::occurrence_mismatch(
                        &patch.name,
                        number,
                        expected,
                        found,
                    ));
                }
                EditEffect::Missing { anchor } => {
                    log_closest(&outcome.content, &anchor);
                    match patch.policy_for(step) {
                        MissingPolicy::Fail => {
                            return Err(RepatchError::anchor_not_found(&patch.name, number, &anchor));
                        }
                        MissingPolicy::Skip => {
                            warn!("Patch {} step {}: anchor not found, skipping", patch.name, number);
                            StepStatus::Skipped { anchor }
                        }
                    }
                }
            }
        };

        let report = StepReport {
            step: number,
            kind: step.edit.kind(),
            label: step.label.clone(),
            status,
        };
        debug!("Patch {}: {}", patch.name, report);
        outcome.steps.push(report);
    }

    outcome.changed = outcome.content != content;
    Ok(outcome)
}

/// Log the line most similar to the first line of a missing anchor
fn log_closest(content: &str, anchor: &str) {
    let first = match anchor.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => line,
        None => return,
    };
    let lines: Vec<&str> = content.lines().collect();
    if let Some((idx, score)) = find_best_match_line(&lines, first) {
        if score < 0.5 {
            debug!("Closest line {}: {}", idx + 1, lines[idx].trim());
        }
    }
}

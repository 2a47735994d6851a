use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Edit, Occurrences, PatchSpec};
use crate::diff::search_replace::parse_search_replace_blocks;
use crate::error::{map_io_err, RepatchError, RepatchResult};

/// Serialization format of a patch file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    Toml,
    Yaml,
    Json,
}

impl PatchFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(PatchFormat::Toml),
            "yaml" | "yml" => Some(PatchFormat::Yaml),
            "json" => Some(PatchFormat::Json),
            _ => None,
        }
    }
}

/// Parse patch text in the given format and validate it
pub fn parse_patch(text: &str, format: PatchFormat, path: &Path) -> RepatchResult<PatchSpec> {
    let mut spec: PatchSpec = match format {
        PatchFormat::Toml => toml::from_str(text)
            .map_err(|e| RepatchError::invalid_patch(e.to_string(), path))?,
        PatchFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|e| RepatchError::invalid_patch(e.to_string(), path))?,
        PatchFormat::Json => serde_json::from_str(text)
            .map_err(|e| RepatchError::invalid_patch(e.to_string(), path))?,
    };

    if spec.name.trim().is_empty() {
        spec.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
    }

    validate(&spec, path)?;
    Ok(spec)
}

/// Read and parse a single patch file
pub fn load_patch(path: impl AsRef<Path>) -> RepatchResult<PatchSpec> {
    let path = path.as_ref();
    let format = PatchFormat::from_path(path).ok_or_else(|| {
        RepatchError::invalid_patch("unsupported extension (use .toml, .yaml, .yml or .json)", path)
    })?;

    let text = std::fs::read_to_string(path).map_err(|e| RepatchError::io_error(e, Some(path)))?;
    let spec = parse_patch(&text, format, path)?;
    debug!("Loaded patch {} from {}", spec.name, path.display());
    Ok(spec)
}

/// Check everything that can be checked without the target file
fn validate(spec: &PatchSpec, path: &Path) -> RepatchResult<()> {
    let invalid = |message: String| RepatchError::invalid_patch(message, path);

    if spec.edits.is_empty() {
        return Err(invalid("patch has no edits".to_string()));
    }
    if spec.target.as_os_str().is_empty() {
        return Err(invalid("target is empty".to_string()));
    }

    for (idx, step) in spec.edits.iter().enumerate() {
        let n = idx + 1;
        match &step.edit {
            Edit::Replace { occurrences, .. } | Edit::Regex { occurrences, .. } => {
                if *occurrences == Occurrences::Exactly(0) {
                    return Err(invalid(format!("step {}: occurrences must be at least 1", n)));
                }
            }
            _ => {}
        }

        match &step.edit {
            Edit::Regex {
                pattern,
                with,
                dot_all,
                expand,
                ..
            } => {
                RegexBuilder::new(pattern)
                    .dot_matches_new_line(*dot_all)
                    .build()
                    .map_err(|e| invalid(format!("step {}: invalid regex: {}", n, e)))?;

                // Expanded output cannot be recognized on a re-run without a guard
                let guarded = step.unless_contains.is_some() || spec.unless_contains.is_some();
                if *expand && !with.is_empty() && !guarded {
                    return Err(invalid(format!(
                        "step {}: regex with expand needs an unless_contains guard",
                        n
                    )));
                }
            }
            Edit::InsertBefore { text, .. }
            | Edit::InsertAfter { text, .. }
            | Edit::InsertAfterBlock { text, .. }
                if text.is_empty() =>
            {
                return Err(invalid(format!("step {}: nothing to insert", n)));
            }
            Edit::ReplaceLines {
                start_marker,
                end_marker,
                ..
            } => {
                if start_marker.is_empty() || end_marker.is_empty() {
                    return Err(invalid(format!("step {}: line markers cannot be empty", n)));
                }
            }
            Edit::InsertAfterBlock { close, .. } if close.is_empty() => {
                return Err(invalid(format!("step {}: close cannot be empty", n)));
            }
            Edit::Blocks { blocks } => {
                parse_search_replace_blocks(blocks)
                    .map_err(|e| invalid(format!("step {}: {}", n, e)))?;
            }
            Edit::Append { text } if text.is_empty() => {
                return Err(invalid(format!("step {}: nothing to append", n)));
            }
            _ => {}
        }

        if !matches!(step.edit, Edit::Append { .. }) && step.edit.anchor().is_empty() {
            return Err(invalid(format!(
                "step {}: {} needs a non-empty anchor",
                n,
                step.edit.kind()
            )));
        }
    }

    Ok(())
}

/// List patch files in a directory, sorted by file name
pub fn discover_patches(dir: impl AsRef<Path>) -> RepatchResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(RepatchError::config_error(format!(
            "patches directory does not exist: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(map_io_err(dir))? {
        let path = entry.map_err(map_io_err(dir))?.path();
        if path.is_file() && PatchFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();

    info!("Found {} patch files in {}", files.len(), dir.display());
    Ok(files)
}

/// Load the patches named by `selectors`, or all of them when empty.
///
/// A selector matches a patch by name, by file stem, or as a glob pattern
/// over file names. Order follows file names, not selector order.
pub fn select_patches(
    dir: impl AsRef<Path>,
    selectors: &[String],
) -> RepatchResult<Vec<(PathBuf, PatchSpec)>> {
    let dir = dir.as_ref();
    let mut loaded = Vec::new();
    for path in discover_patches(dir)? {
        let spec = load_patch(&path)?;
        loaded.push((path, spec));
    }

    if selectors.is_empty() {
        return Ok(loaded);
    }

    let mut patterns = Vec::new();
    for selector in selectors {
        let pattern = glob::Pattern::new(selector)
            .map_err(|e| RepatchError::config_error(format!("bad selector '{}': {}", selector, e)))?;
        patterns.push((selector, pattern));
    }

    for (selector, pattern) in &patterns {
        let hit = loaded
            .iter()
            .any(|(path, spec)| selector_matches(selector, pattern, path, spec));
        if !hit {
            return Err(RepatchError::config_error(format!(
                "no patch matches '{}'",
                selector
            )));
        }
    }

    Ok(loaded
        .into_iter()
        .filter(|(path, spec)| {
            patterns
                .iter()
                .any(|(selector, pattern)| selector_matches(selector, pattern, path, spec))
        })
        .collect())
}

fn selector_matches(selector: &str, pattern: &glob::Pattern, path: &Path, spec: &PatchSpec) -> bool {
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    spec.name == selector || stem == selector || pattern.matches(&file_name) || pattern.matches(&stem)
}

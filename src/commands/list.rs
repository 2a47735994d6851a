use std::fmt::Write as _;

use super::Workspace;
use crate::error::RepatchResult;
use crate::patch::select_patches;

/// One line per patch: name, target, edit count and description
pub fn list_patches(workspace: &Workspace, selectors: &[String]) -> RepatchResult<String> {
    let patches = select_patches(&workspace.patches_dir, selectors)?;

    let mut out = String::new();
    for (_, spec) in &patches {
        let _ = write!(out, "{}", spec);
        if let Some(description) = &spec.description {
            let _ = write!(out, "  {}", description);
        }
        out.push('\n');
    }
    Ok(out)
}

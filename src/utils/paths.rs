use std::path::{Component, Path, PathBuf};

use crate::error::{RepatchError, RepatchResult};

/// Expand the tilde in a path to the home directory
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically normalize `.` and `..` without touching the filesystem.
/// Returns `None` if `..` climbs above the start of a relative path.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Resolve a patch target against the root.
///
/// Relative targets must stay inside `root`. Absolute targets (and targets
/// climbing out with `..`) are only accepted with `allow_outside_root`.
pub fn resolve_target(root: &Path, target: &Path, allow_outside_root: bool) -> RepatchResult<PathBuf> {
    let target = expand_tilde(target);

    if target.is_absolute() || target.has_root() {
        if allow_outside_root {
            return Ok(target);
        }
        return Err(RepatchError::invalid_path(format!(
            "{} is absolute; targets must be relative to the root",
            target.display()
        )));
    }

    match normalize_lexically(&target) {
        Some(relative) if !relative.as_os_str().is_empty() => Ok(root.join(relative)),
        Some(_) => Err(RepatchError::invalid_path(target.display().to_string())),
        None if allow_outside_root => Ok(root.join(target)),
        None => Err(RepatchError::invalid_path(format!(
            "{} escapes the root directory",
            target.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/test.txt"), home.join("test.txt"));
        assert_eq!(expand_tilde("/tmp/test.txt"), PathBuf::from("/tmp/test.txt"));
    }

    #[test]
    fn test_resolve_relative() {
        let root = Path::new("/srv/scheduler");
        assert_eq!(
            resolve_target(root, Path::new("js/app.js"), false).unwrap(),
            PathBuf::from("/srv/scheduler/js/app.js")
        );
        assert_eq!(
            resolve_target(root, Path::new("./css/../css/styles.css"), false).unwrap(),
            PathBuf::from("/srv/scheduler/css/styles.css")
        );
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/srv/scheduler");
        assert!(resolve_target(root, Path::new("../etc/passwd"), false).is_err());
        assert!(resolve_target(root, Path::new("/etc/passwd"), false).is_err());
        assert!(resolve_target(root, Path::new("."), false).is_err());
        assert_eq!(
            resolve_target(root, Path::new("/etc/hosts"), true).unwrap(),
            PathBuf::from("/etc/hosts")
        );
    }
}

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{map_io_err, RepatchError, RepatchResult};

/// SHA-256 of a string, hex encoded
pub fn calculate_string_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read a target file as UTF-8. A missing file is `TargetMissing`.
pub async fn read_text(path: impl AsRef<Path>) -> RepatchResult<String> {
    let path = path.as_ref();
    debug!("Reading file: {}", path.display());
    tokio::fs::read_to_string(path).await.map_err(map_io_err(path))
}

/// Replace `path` with `content` through a temp file in the same directory.
///
/// When `expected_hash` is given, the current file must still hash to it,
/// otherwise nothing is written and `ConcurrentModification` is returned.
/// Permissions of an existing file are carried over.
pub fn write_atomic(
    path: impl AsRef<Path>,
    content: &str,
    expected_hash: Option<&str>,
) -> RepatchResult<()> {
    let path = path.as_ref();
    debug!("Writing file atomically: {}", path.display());

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let existing = std::fs::metadata(path).ok();

    if let Some(expected) = expected_hash {
        let current = std::fs::read_to_string(path).map_err(map_io_err(path))?;
        if calculate_string_hash(&current) != expected {
            warn!("File changed since it was read: {}", path.display());
            return Err(RepatchError::concurrent_modification(path));
        }
    }

    let mut tmp = NamedTempFile::new_in(parent).map_err(map_io_err(parent))?;
    tmp.write_all(content.as_bytes()).map_err(map_io_err(tmp.path()))?;
    tmp.flush().map_err(map_io_err(tmp.path()))?;

    if let Some(meta) = existing {
        std::fs::set_permissions(tmp.path(), meta.permissions()).map_err(map_io_err(tmp.path()))?;
    }

    tmp.persist(path)
        .map_err(|e| RepatchError::io_error(e.error, Some(path)))?;
    Ok(())
}

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for repatch
#[derive(Error, Debug)]
pub enum RepatchError {
    #[error("IO error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Target file not found: {}", path.display())]
    TargetMissing { path: PathBuf },

    #[error("Patch '{patch}' step {step}: anchor not found: {anchor}")]
    AnchorNotFound {
        patch: String,
        step: usize,
        anchor: String,
    },

    #[error("Patch '{patch}' step {step}: expected {expected} occurrence(s), found {found}")]
    OccurrenceMismatch {
        patch: String,
        step: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid patch {}: {message}", path.display())]
    InvalidPatch { message: String, path: PathBuf },

    #[error("Invalid file path: {path}")]
    InvalidPath { path: String },

    #[error("File changed while patching: {}", path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("Checkpoint {id} does not match current contents of {}", path.display())]
    CheckpointConflict { id: String, path: PathBuf },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl RepatchError {
    /// Create a new IO error with path context
    pub fn io_error(err: std::io::Error, path: Option<impl Into<PathBuf>>) -> Self {
        Self::Io {
            source: err,
            path: path.map(|p| p.into()),
        }
    }

    pub fn target_missing(path: impl Into<PathBuf>) -> Self {
        Self::TargetMissing { path: path.into() }
    }

    /// Create an anchor error, truncating long anchors to their first line
    pub fn anchor_not_found(patch: impl Into<String>, step: usize, anchor: &str) -> Self {
        Self::AnchorNotFound {
            patch: patch.into(),
            step,
            anchor: excerpt(anchor),
        }
    }

    pub fn occurrence_mismatch(
        patch: impl Into<String>,
        step: usize,
        expected: usize,
        found: usize,
    ) -> Self {
        Self::OccurrenceMismatch {
            patch: patch.into(),
            step,
            expected,
            found,
        }
    }

    /// Create a new invalid patch error
    pub fn invalid_patch(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::InvalidPatch {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a new invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    pub fn concurrent_modification(path: impl Into<PathBuf>) -> Self {
        Self::ConcurrentModification { path: path.into() }
    }

    pub fn checkpoint_not_found(id: impl Into<String>) -> Self {
        Self::CheckpointNotFound { id: id.into() }
    }

    pub fn checkpoint_conflict(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::CheckpointConflict {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Short machine-readable name of the variant, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            RepatchError::Io { .. } => "io_error",
            RepatchError::TargetMissing { .. } => "target_missing",
            RepatchError::AnchorNotFound { .. } => "anchor_not_found",
            RepatchError::OccurrenceMismatch { .. } => "occurrence_mismatch",
            RepatchError::InvalidPatch { .. } => "invalid_patch",
            RepatchError::InvalidPath { .. } => "invalid_path",
            RepatchError::ConcurrentModification { .. } => "concurrent_modification",
            RepatchError::CheckpointNotFound { .. } => "checkpoint_not_found",
            RepatchError::CheckpointConflict { .. } => "checkpoint_conflict",
            RepatchError::ParseError { .. } => "parse_error",
            RepatchError::Config { .. } => "config_error",
        }
    }
}

/// First line of `text`, cut at 60 characters
fn excerpt(text: &str) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = first.trim();
    let mut out: String = trimmed.chars().take(60).collect();
    if out.len() < trimmed.len() || text.trim().lines().count() > 1 {
        out.push_str("...");
    }
    format!("{:?}", out)
}

impl From<std::io::Error> for RepatchError {
    fn from(error: std::io::Error) -> Self {
        RepatchError::io_error(error, None::<PathBuf>)
    }
}

impl From<serde_json::Error> for RepatchError {
    fn from(error: serde_json::Error) -> Self {
        RepatchError::parse_error(error.to_string())
    }
}

impl From<serde_yaml::Error> for RepatchError {
    fn from(error: serde_yaml::Error) -> Self {
        RepatchError::parse_error(error.to_string())
    }
}

impl From<toml::de::Error> for RepatchError {
    fn from(error: toml::de::Error) -> Self {
        RepatchError::parse_error(error.to_string())
    }
}

impl From<regex::Error> for RepatchError {
    fn from(error: regex::Error) -> Self {
        RepatchError::parse_error(error.to_string())
    }
}

/// Result type alias using RepatchError
pub type RepatchResult<T> = Result<T, RepatchError>;

/// Contextual error mapping function
pub fn map_io_err<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> RepatchError {
    let path = path.into();
    move |err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            RepatchError::target_missing(path)
        } else {
            RepatchError::io_error(err, Some(path))
        }
    }
}

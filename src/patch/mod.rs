pub mod loader;

pub use loader::{discover_patches, load_patch, parse_patch, select_patches, PatchFormat};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What to do when an edit's anchor is absent from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Abort the patch and leave the target untouched
    #[default]
    Fail,
    /// Record the step as skipped and carry on
    Skip,
}

/// How many matches a replacement touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrences {
    #[default]
    All,
    First,
    /// Exactly this many matches must exist, all of them are replaced
    Exactly(usize),
}

// Accepts "all", "first" or a positive integer.
impl Serialize for Occurrences {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Occurrences::All => serializer.serialize_str("all"),
            Occurrences::First => serializer.serialize_str("first"),
            Occurrences::Exactly(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Occurrences {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Count(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => match name.as_str() {
                "all" => Ok(Occurrences::All),
                "first" => Ok(Occurrences::First),
                other => Err(serde::de::Error::custom(format!(
                    "unknown occurrences '{}', expected \"all\", \"first\" or a count",
                    other
                ))),
            },
            Raw::Count(n) => Ok(Occurrences::Exactly(n as usize)),
        }
    }
}

fn default_close() -> String {
    "}".to_string()
}

/// A single textual mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Edit {
    /// Literal substring replacement
    Replace {
        find: String,
        with: String,
        #[serde(default)]
        occurrences: Occurrences,
    },
    /// Regular expression replacement
    Regex {
        pattern: String,
        with: String,
        /// Let `.` match newlines
        #[serde(default)]
        dot_all: bool,
        /// Expand `$name` / `$1` references in `with`
        #[serde(default)]
        expand: bool,
        #[serde(default)]
        occurrences: Occurrences,
    },
    InsertBefore {
        anchor: String,
        text: String,
    },
    InsertAfter {
        anchor: String,
        text: String,
    },
    /// Insert after the first `close` that follows `anchor`
    InsertAfterBlock {
        anchor: String,
        #[serde(default = "default_close")]
        close: String,
        text: String,
    },
    /// Replace the run of lines around the first line containing `contains`,
    /// from the nearest preceding line containing `start_marker` to the next
    /// line containing `end_marker`
    ReplaceLines {
        contains: String,
        start_marker: String,
        end_marker: String,
        text: String,
    },
    Append {
        text: String,
    },
    /// SEARCH/REPLACE blocks matched with whitespace tolerance
    Blocks {
        blocks: String,
    },
}

impl Edit {
    pub fn kind(&self) -> &'static str {
        match self {
            Edit::Replace { .. } => "replace",
            Edit::Regex { .. } => "regex",
            Edit::InsertBefore { .. } => "insert_before",
            Edit::InsertAfter { .. } => "insert_after",
            Edit::InsertAfterBlock { .. } => "insert_after_block",
            Edit::ReplaceLines { .. } => "replace_lines",
            Edit::Append { .. } => "append",
            Edit::Blocks { .. } => "blocks",
        }
    }

    /// The text this edit looks for, used in error messages
    pub fn anchor(&self) -> &str {
        match self {
            Edit::Replace { find, .. } => find,
            Edit::Regex { pattern, .. } => pattern,
            Edit::InsertBefore { anchor, .. }
            | Edit::InsertAfter { anchor, .. }
            | Edit::InsertAfterBlock { anchor, .. } => anchor,
            Edit::ReplaceLines { contains, .. } => contains,
            Edit::Append { .. } => "",
            Edit::Blocks { blocks } => blocks,
        }
    }
}

/// An edit plus its guards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Treat the step as already applied when the target contains this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_contains: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_missing: Option<MissingPolicy>,

    #[serde(flatten)]
    pub edit: Edit,
}

impl EditStep {
    pub fn new(edit: Edit) -> Self {
        Self {
            label: None,
            unless_contains: None,
            on_missing: None,
            edit,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn skip_if_missing(mut self) -> Self {
        self.on_missing = Some(MissingPolicy::Skip);
        self
    }

    pub fn unless_contains(mut self, text: impl Into<String>) -> Self {
        self.unless_contains = Some(text.into());
        self
    }
}

/// One patch file: a batch of edits against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSpec {
    /// Defaults to the file stem when loaded from disk
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Target path relative to the configured root
    pub target: PathBuf,

    /// Confirmation printed after a successful write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Skip the whole patch when the target already contains this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_contains: Option<String>,

    #[serde(default)]
    pub on_missing: MissingPolicy,

    pub edits: Vec<EditStep>,
}

impl PatchSpec {
    pub fn new(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: None,
            target: target.into(),
            message: None,
            unless_contains: None,
            on_missing: MissingPolicy::Fail,
            edits: Vec::new(),
        }
    }

    pub fn with_edit(mut self, step: EditStep) -> Self {
        self.edits.push(step);
        self
    }

    /// Effective missing-anchor policy of a step
    pub fn policy_for(&self, step: &EditStep) -> MissingPolicy {
        step.on_missing.unwrap_or(self.on_missing)
    }
}

impl fmt::Display for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({} edit{})",
            self.name,
            self.target.display(),
            self.edits.len(),
            if self.edits.len() == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences_deserialize() {
        #[derive(Deserialize)]
        struct Holder {
            occurrences: Occurrences,
        }

        let h: Holder = toml::from_str("occurrences = \"first\"").unwrap();
        assert_eq!(h.occurrences, Occurrences::First);
        let h: Holder = toml::from_str("occurrences = 2").unwrap();
        assert_eq!(h.occurrences, Occurrences::Exactly(2));
        assert!(toml::from_str::<Holder>("occurrences = \"most\"").is_err());
    }

    #[test]
    fn test_step_policy_falls_back_to_patch() {
        let patch = PatchSpec::new("p", "js/app.js");
        let step = EditStep::new(Edit::Append {
            text: "x".to_string(),
        });
        assert_eq!(patch.policy_for(&step), MissingPolicy::Fail);
        assert_eq!(
            patch.policy_for(&step.clone().skip_if_missing()),
            MissingPolicy::Skip
        );
    }

    #[test]
    fn test_display() {
        let patch = PatchSpec::new("add-back-button", "index.html").with_edit(EditStep::new(
            Edit::Append {
                text: "x".to_string(),
            },
        ));
        assert_eq!(patch.to_string(), "add-back-button -> index.html (1 edit)");
    }
}

use similar::{ChangeTag, TextDiff};
use std::path::Path;

/// Line counts of a change, for summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub inserted: usize,
    pub deleted: usize,
}

/// Renders a unified diff of `before` → `after` labelled with `path`.
/// Returns an empty string when the texts are equal.
pub fn render(path: &Path, before: &str, after: &str, context: usize) -> String {
    if before == after {
        return String::new();
    }

    let label = path.display().to_string();
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(context)
        .header(&format!("a/{}", label), &format!("b/{}", label))
        .to_string()
}

pub fn stat(before: &str, after: &str) -> DiffStat {
    let mut stat = DiffStat::default();
    for change in TextDiff::from_lines(before, after).iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stat.inserted += 1,
            ChangeTag::Delete => stat.deleted += 1,
            ChangeTag::Equal => {}
        }
    }
    stat
}

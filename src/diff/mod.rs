pub mod checkpoint;
pub mod search_replace;
pub mod unified;

pub use checkpoint::{Checkpoint, CheckpointManager, FileChange, RestoreOutcome};
pub use search_replace::{apply_search_replace, parse_search_replace_blocks, SearchReplaceBlock};
pub use unified::{render as render_unified, stat as diff_stat, DiffStat};

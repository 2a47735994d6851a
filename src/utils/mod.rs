pub mod fs;
pub mod paths;

pub use fs::{calculate_string_hash, read_text, write_atomic};
pub use paths::{expand_tilde, resolve_target};

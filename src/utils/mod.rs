//! Shared utilities.

pub mod path;

pub use path::{is_temp_file, normalize_path};

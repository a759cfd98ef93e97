// crates/core/src/paths.rs
//! Centralized path functions for storage locations.

use std::path::PathBuf;

/// App cache root: `~/Library/Caches/verbal-assess/` (macOS) or
/// `~/.cache/verbal-assess/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("verbal-assess"))
}

/// SQLite database file: `<app_cache_dir>/verbal-assess.db`.
pub fn db_path() -> Option<PathBuf> {
    app_cache_dir().map(|d| d.join("verbal-assess.db"))
}

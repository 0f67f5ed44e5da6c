//! Centralized path configuration for berth.
//!
//! All data paths go through this module so the CLI and tests agree on where
//! state lives.

use std::path::PathBuf;

/// Get the berth data directory.
///
/// Resolution order:
/// 1. `BERTH_DATA_DIR` environment variable
/// 2. `~/.berth`
/// 3. `.berth` in the working directory when no home directory is known
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BERTH_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".berth")).unwrap_or_else(|| PathBuf::from(".berth"))
}

/// Get the database path.
pub fn db_path() -> PathBuf {
    data_dir().join("berth.db")
}

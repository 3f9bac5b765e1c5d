//! Filesystem locations for retrace data.

use std::path::PathBuf;

/// Base data directory (`~/.retrace`), falling back to the current
/// directory when no home is resolvable.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".retrace"))
        .unwrap_or_else(|| PathBuf::from(".retrace"))
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("retrace.log")
}

/// Root for per-session generated artifacts.
pub fn artifacts_dir() -> PathBuf {
    data_dir().join("artifacts")
}

//! Utility modules

pub mod paths;

pub use paths::{artifacts_dir, data_dir, log_file_path, logs_dir};

//! Application configuration with TOML overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::capture::session::CaptureConfig;
use crate::core::pipeline::PipelineConfig;
use crate::util::paths::artifacts_dir;
use crate::verify::harness::HarnessConfig;

/// Resolved settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bounded capture queue capacity.
    pub queue_capacity: usize,
    /// Whether to run the verification stage.
    pub verify: bool,
    /// Verification timeout for compile+run.
    pub verify_timeout: Duration,
    /// Cargo.toml of the target crate generated tests link against.
    pub target_manifest: Option<PathBuf>,
    /// Explicit cargo binary path.
    pub cargo_path: Option<PathBuf>,
    /// Root directory for per-session artifacts.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            verify: true,
            verify_timeout: Duration::from_secs(120),
            target_manifest: None,
            cargo_path: None,
            output_dir: artifacts_dir(),
        }
    }
}

/// Partial file representation; absent keys keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSettings {
    pub capture: Option<TomlCaptureSettings>,
    pub verify: Option<TomlVerifySettings>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlCaptureSettings {
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlVerifySettings {
    pub enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub target_manifest: Option<PathBuf>,
    pub cargo_path: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let parsed: TomlSettings = toml::from_str(raw)?;
        Ok(Self::default().merged_with(parsed))
    }

    fn merged_with(mut self, toml: TomlSettings) -> Self {
        if let Some(capture) = toml.capture {
            if let Some(capacity) = capture.queue_capacity {
                self.queue_capacity = capacity;
            }
        }
        if let Some(verify) = toml.verify {
            if let Some(enabled) = verify.enabled {
                self.verify = enabled;
            }
            if let Some(timeout_ms) = verify.timeout_ms {
                self.verify_timeout = Duration::from_millis(timeout_ms);
            }
            if verify.target_manifest.is_some() {
                self.target_manifest = verify.target_manifest;
            }
            if verify.cargo_path.is_some() {
                self.cargo_path = verify.cargo_path;
            }
        }
        if let Some(output_dir) = toml.output_dir {
            self.output_dir = output_dir;
        }
        self
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            capture: CaptureConfig {
                queue_capacity: self.queue_capacity,
            },
            output_dir: self.output_dir.clone(),
            verify: self.verify,
        }
    }

    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            timeout: self.verify_timeout,
            target_manifest: self.target_manifest.clone(),
            cargo_path: self.cargo_path.clone(),
        }
    }
}

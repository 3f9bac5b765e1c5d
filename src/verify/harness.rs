//! The process boundary of verification: compile and execute a generated
//! test in an isolated scratch project.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::codegen::statement::GeneratedTest;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("harness I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("build tool not found: {0}")]
    BuildToolMissing(String),

    #[error("target manifest is invalid: {0}")]
    InvalidTargetManifest(String),
}

/// What happened when the generated unit was compiled and executed once.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub compiled: bool,
    pub diagnostics: Vec<String>,
    pub test_passed: bool,
    pub timed_out: bool,
    /// Assertion delta or panic output when the test failed.
    pub failure_output: Option<String>,
}

impl ExecutionReport {
    pub fn passing() -> Self {
        Self {
            compiled: true,
            diagnostics: Vec::new(),
            test_passed: true,
            timed_out: false,
            failure_output: None,
        }
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self {
            compiled: true,
            diagnostics: Vec::new(),
            test_passed: false,
            timed_out: false,
            failure_output: Some(output.into()),
        }
    }

    pub fn compile_error(diagnostics: Vec<String>) -> Self {
        Self {
            compiled: false,
            diagnostics,
            test_passed: false,
            timed_out: false,
            failure_output: None,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            compiled: true,
            diagnostics: Vec::new(),
            test_passed: false,
            timed_out: true,
            failure_output: None,
        }
    }
}

/// Executes a generated test in isolation.
#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn run(
        &self,
        test: &GeneratedTest,
        scratch_dir: &Path,
    ) -> Result<ExecutionReport, HarnessError>;
}

/// Harness knobs; the timeout bounds the whole compile+run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub timeout: Duration,
    /// Cargo.toml of the target crate the generated test links against.
    pub target_manifest: Option<PathBuf>,
    /// Explicit cargo binary; discovered on PATH when absent.
    pub cargo_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            target_manifest: None,
            cargo_path: None,
        }
    }
}

/// Real harness: writes a scratch cargo project with the target crate as a
/// path dependency and runs `cargo test` under a timeout.
pub struct CargoHarness {
    cargo: PathBuf,
    config: HarnessConfig,
}

impl CargoHarness {
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        let cargo = match &config.cargo_path {
            Some(path) => path.clone(),
            None => which::which("cargo")
                .map_err(|e| HarnessError::BuildToolMissing(e.to_string()))?,
        };
        Ok(Self { cargo, config })
    }

    fn target_dependency(&self) -> Result<Option<(String, PathBuf)>, HarnessError> {
        let Some(manifest_path) = &self.config.target_manifest else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(manifest_path)?;
        let manifest: toml::Value = raw
            .parse()
            .map_err(|e| HarnessError::InvalidTargetManifest(format!("{e}")))?;
        let name = manifest
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| {
                HarnessError::InvalidTargetManifest("missing package.name".to_string())
            })?
            .to_string();
        let dir = manifest_path
            .parent()
            .ok_or_else(|| {
                HarnessError::InvalidTargetManifest("manifest has no parent directory".to_string())
            })?
            .to_path_buf();
        Ok(Some((name, dir)))
    }

    fn write_scratch_project(
        &self,
        test: &GeneratedTest,
        dir: &Path,
    ) -> Result<(), HarnessError> {
        let mut manifest = String::new();
        manifest.push_str("[package]\n");
        manifest.push_str("name = \"retrace-verify\"\n");
        manifest.push_str("version = \"0.0.0\"\n");
        manifest.push_str("edition = \"2021\"\n\n");
        manifest.push_str("[dependencies]\n");
        if let Some((name, path)) = self.target_dependency()? {
            manifest.push_str(&format!("{name} = {{ path = {path:?} }}\n"));
        }

        std::fs::write(dir.join("Cargo.toml"), manifest)?;
        std::fs::create_dir_all(dir.join("src"))?;
        std::fs::write(dir.join("src").join("lib.rs"), "")?;
        std::fs::create_dir_all(dir.join("tests"))?;
        std::fs::write(dir.join("tests").join("repro.rs"), &test.source)?;
        Ok(())
    }
}

#[async_trait]
impl TestHarness for CargoHarness {
    async fn run(
        &self,
        test: &GeneratedTest,
        scratch_dir: &Path,
    ) -> Result<ExecutionReport, HarnessError> {
        self.write_scratch_project(test, scratch_dir)?;

        let mut cmd = Command::new(&self.cargo);
        cmd.arg("test")
            .arg("--test")
            .arg("repro")
            .current_dir(scratch_dir)
            .env("CARGO_TERM_COLOR", "never")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout must take the process with it.
            .kill_on_drop(true);

        tracing::debug!(test = %test.name, dir = %scratch_dir.display(), "running verification harness");

        let child = cmd.spawn()?;
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(test = %test.name, "verification timed out");
                return Ok(ExecutionReport::timed_out());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let diagnostics = compile_diagnostics(&stderr);
        if !diagnostics.is_empty() {
            return Ok(ExecutionReport::compile_error(diagnostics));
        }

        if output.status.success() {
            Ok(ExecutionReport::passing())
        } else {
            Ok(ExecutionReport::failing(extract_failure(&stdout, &stderr)))
        }
    }
}

/// Compiler error lines from cargo's stderr.
fn compile_diagnostics(stderr: &str) -> Vec<String> {
    let Ok(error_line) = Regex::new(r"^error(\[E\d+\])?:") else {
        return Vec::new();
    };
    stderr
        .lines()
        .filter(|line| error_line.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Assertion delta from a failed test run: the panic lines, falling back to
/// the tail of the combined output.
fn extract_failure(stdout: &str, stderr: &str) -> String {
    let interesting: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|line| {
            line.contains("panicked at")
                || line.contains("assertion")
                || line.contains("unexpected failure")
        })
        .collect();
    if interesting.is_empty() {
        let tail: Vec<&str> = stdout.lines().rev().take(10).collect();
        tail.into_iter().rev().collect::<Vec<_>>().join("\n")
    } else {
        interesting.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_diagnostics_picks_error_lines() {
        let stderr = "\
warning: unused variable\n\
error[E0308]: mismatched types\n\
 --> tests/repro.rs:3:5\n\
error: could not compile `retrace-verify` (test \"repro\")\n";
        let diags = compile_diagnostics(stderr);
        assert_eq!(diags.len(), 2);
        assert!(diags[0].contains("E0308"));
    }

    #[test]
    fn extract_failure_prefers_panic_lines() {
        let stdout = "\
running 1 test\n\
thread 'reproduces_div' panicked at tests/repro.rs:9:5:\n\
unexpected failure: attempt to divide by zero\n\
test reproduces_div ... FAILED\n";
        let delta = extract_failure(stdout, "");
        assert!(delta.contains("panicked at"));
        assert!(delta.contains("unexpected failure"));
    }
}

//! Mock harness for deterministic testing.
//!
//! Implements [`TestHarness`] to return scripted execution reports without
//! compiling anything, and captures every run for later assertions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codegen::statement::GeneratedTest;
use crate::verify::harness::{ExecutionReport, HarnessError, TestHarness};

/// Scripted harness: always answers with the configured report.
pub struct MockHarness {
    report: ExecutionReport,
    error: Option<String>,
    /// (test name, scratch dir) per run, for verification in tests.
    captured_runs: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl MockHarness {
    pub fn new(report: ExecutionReport) -> Self {
        Self {
            report,
            error: None,
            captured_runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn passing() -> Self {
        Self::new(ExecutionReport::passing())
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self::new(ExecutionReport::failing(output))
    }

    pub fn compile_error(diagnostics: Vec<String>) -> Self {
        Self::new(ExecutionReport::compile_error(diagnostics))
    }

    pub fn timing_out() -> Self {
        Self::new(ExecutionReport::timed_out())
    }

    /// Fail the harness itself (I/O trouble, missing build tool).
    pub fn erroring(message: impl Into<String>) -> Self {
        Self {
            report: ExecutionReport::passing(),
            error: Some(message.into()),
            captured_runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn captured_runs(&self) -> Vec<(String, PathBuf)> {
        self.captured_runs.lock().clone()
    }

    /// Handle to the capture list that survives moving the harness.
    pub fn runs_handle(&self) -> Arc<Mutex<Vec<(String, PathBuf)>>> {
        self.captured_runs.clone()
    }
}

#[async_trait]
impl TestHarness for MockHarness {
    async fn run(
        &self,
        test: &GeneratedTest,
        scratch_dir: &Path,
    ) -> Result<ExecutionReport, HarnessError> {
        self.captured_runs
            .lock()
            .push((test.name.clone(), scratch_dir.to_path_buf()));
        if let Some(message) = &self.error {
            return Err(HarnessError::BuildToolMissing(message.clone()));
        }
        Ok(self.report.clone())
    }
}

//! One end-to-end session: capture → analyze → generate → verify.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::capture::feed::EventFeed;
use crate::capture::pump::run_capture;
use crate::capture::session::{CaptureConfig, CaptureSession};
use crate::codegen::generator::{GenerateError, TestGenerator};
use crate::codegen::statement::GeneratedArtifacts;
use crate::verify::harness::TestHarness;
use crate::verify::runner::VerificationRunner;
use crate::verify::verdict::VerificationVerdict;

/// Pipeline stages. Data flows strictly forward; a terminal transition is
/// never followed by more stage work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Capturing,
    Analyzing,
    Generating,
    Verifying,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Capturing => "capturing",
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Terminal state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TerminalState {
    Done,
    Failed { stage: Stage, reason: String },
}

/// Structured record returned to the front end, independent of rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub target: String,
    #[serde(flatten)]
    pub state: TerminalState,
    pub verdict: Option<VerificationVerdict>,
    pub diagnostics: Vec<String>,
    pub trace_size: usize,
    pub slice_size: usize,
    pub artifacts: Option<GeneratedArtifacts>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    /// Per-session artifact directories are created under this root.
    pub output_dir: PathBuf,
    /// Skip the verification stage (no build tool available).
    pub verify: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            output_dir: PathBuf::from("retrace-out"),
            verify: true,
        }
    }
}

/// Drives one pipeline run. A new orchestrator is required per session:
/// terminal states never re-execute.
pub struct SessionOrchestrator {
    config: PipelineConfig,
    harness: Arc<dyn TestHarness>,
    cancel: CancellationToken,
}

impl SessionOrchestrator {
    pub fn new(config: PipelineConfig, harness: Arc<dyn TestHarness>) -> Self {
        Self {
            config,
            harness,
            cancel: CancellationToken::new(),
        }
    }

    /// Token the front end can use to cancel the session. Capture honors it
    /// between events; later stages check it before starting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run<F>(self, target: &str, feed: F) -> SessionResult
    where
        F: EventFeed + 'static,
    {
        let session = CaptureSession::begin(target);
        let session_id = session.session_id();
        let mut diagnostics = Vec::new();

        let mut result = SessionResult {
            session_id,
            target: target.to_string(),
            state: TerminalState::Done,
            verdict: None,
            diagnostics: Vec::new(),
            trace_size: 0,
            slice_size: 0,
            artifacts: None,
        };

        // Capturing
        tracing::info!(session = %session_id, stage = %Stage::Capturing, "stage started");
        if self.cancel.is_cancelled() {
            return failed(result, Stage::Capturing, "session cancelled", diagnostics);
        }
        let trace = match run_capture(feed, session, &self.config.capture, self.cancel.clone())
            .await
        {
            Ok(trace) => trace,
            Err(e) => return failed(result, Stage::Capturing, &e.to_string(), diagnostics),
        };
        result.trace_size = trace.len();
        for incident in trace.incidents() {
            diagnostics.push(format!(
                "capture incident on {}: {}",
                incident.activation, incident.detail
            ));
        }

        // Analyzing
        tracing::info!(session = %session_id, stage = %Stage::Analyzing, "stage started");
        if self.cancel.is_cancelled() {
            return failed(result, Stage::Analyzing, "session cancelled", diagnostics);
        }
        let slice = match Analyzer::new().analyze_designated(&trace) {
            Ok(slice) => slice,
            Err(e) => return failed(result, Stage::Analyzing, &e.to_string(), diagnostics),
        };
        result.slice_size = slice.len();

        // Generating
        tracing::info!(session = %session_id, stage = %Stage::Generating, "stage started");
        if self.cancel.is_cancelled() {
            return failed(result, Stage::Generating, "session cancelled", diagnostics);
        }
        let test = match TestGenerator::new().generate(&slice) {
            Ok(test) => test,
            Err(e @ GenerateError::UnsupportedConstruct { .. }) => {
                // Recoverable by contract: the session completes with a
                // downgraded verdict instead of aborting.
                diagnostics.push(e.to_string());
                result.verdict = Some(VerificationVerdict::PartiallyReproduced {
                    reason: e.to_string(),
                });
                result.diagnostics = diagnostics;
                return result;
            }
            Err(e) => return failed(result, Stage::Generating, &e.to_string(), diagnostics),
        };

        let artifact_dir = self.config.output_dir.join(session_id.to_string());
        match test.write_to(&artifact_dir) {
            Ok(artifacts) => result.artifacts = Some(artifacts),
            Err(e) => {
                return failed(
                    result,
                    Stage::Generating,
                    &format!("could not write artifacts: {e}"),
                    diagnostics,
                )
            }
        }

        // Verifying
        if !self.config.verify {
            diagnostics.push("verification skipped by configuration".to_string());
            result.diagnostics = diagnostics;
            return result;
        }
        tracing::info!(session = %session_id, stage = %Stage::Verifying, "stage started");
        if self.cancel.is_cancelled() {
            return failed(result, Stage::Verifying, "session cancelled", diagnostics);
        }
        let verdict = VerificationRunner::new(self.harness.clone())
            .verify(&test)
            .await;
        tracing::info!(session = %session_id, verdict = %verdict, "session done");

        result.verdict = Some(verdict);
        result.diagnostics = diagnostics;
        result
    }
}

fn failed(
    mut result: SessionResult,
    stage: Stage,
    reason: &str,
    mut diagnostics: Vec<String>,
) -> SessionResult {
    tracing::warn!(session = %result.session_id, %stage, reason, "session failed");
    diagnostics.push(format!("{stage}: {reason}"));
    result.state = TerminalState::Failed {
        stage,
        reason: reason.to_string(),
    };
    result.diagnostics = diagnostics;
    result
}

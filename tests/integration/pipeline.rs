//! End-to-end pipeline flows over scripted feeds and a mock harness.

use std::sync::Arc;

use tempfile::tempdir;

use retrace::capture::mock::MockEventFeed;
use retrace::capture::CaptureConfig;
use retrace::core::{PipelineConfig, SessionOrchestrator, TerminalState};
use retrace::verify::{MockHarness, VerificationVerdict};

use super::common::fixtures;

fn config(dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        capture: CaptureConfig::default(),
        output_dir: dir.to_path_buf(),
        verify: true,
    }
}

/// Scenario A: a single root invocation throws; the slice is just that
/// invocation and the generated test asserts the thrown kind.
#[tokio::test]
async fn single_throwing_invocation_is_reproduced() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::DIVIDE_BY_ZERO.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert_eq!(result.verdict, Some(VerificationVerdict::Reproduced));
    assert_eq!(result.trace_size, 1);
    assert_eq!(result.slice_size, 1);

    let artifacts = result.artifacts.expect("artifacts written");
    let source = std::fs::read_to_string(&artifacts.source_path).unwrap();
    assert!(source.contains("catch_unwind"));
    assert!(source.contains("DivideByZero"));
}

/// Scenario B: g only forwards x from f to h; the slice keeps f as context
/// and h as the failure, and drops g entirely.
#[tokio::test]
async fn pass_through_callee_is_sliced_away() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::f",
            MockEventFeed::new(fixtures::PASS_THROUGH_CHAIN.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert_eq!(result.verdict, Some(VerificationVerdict::Reproduced));
    assert_eq!(result.trace_size, 3);
    assert_eq!(result.slice_size, 2);

    let artifacts = result.artifacts.expect("artifacts written");
    let source = std::fs::read_to_string(&artifacts.source_path).unwrap();
    assert!(source.contains("app::h"));
    assert!(!source.contains("app::g("));
}

/// Scenario C: an open file handle argument was captured as
/// unrepresentable; a stub is substituted and the verdict degrades.
#[tokio::test]
async fn unrepresentable_argument_degrades_to_partial() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::read_header",
            MockEventFeed::new(fixtures::OPEN_FILE_HANDLE.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert!(matches!(
        result.verdict,
        Some(VerificationVerdict::PartiallyReproduced { ref reason })
            if reason.contains("std::fs::File")
    ));

    let artifacts = result.artifacts.expect("artifacts written");
    let manifest = std::fs::read_to_string(&artifacts.manifest_path).unwrap();
    assert!(manifest.contains("open file handle"));
}

/// Scenario D: a stray exit on a disjoint activation is recorded as an
/// incident, and the session still completes with a full reproduction.
#[tokio::test]
async fn malformed_disjoint_subtree_does_not_block_reproduction() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::STRAY_EXIT_THEN_FAILURE.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert_eq!(result.verdict, Some(VerificationVerdict::Reproduced));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.contains("capture incident")));
}

/// Aliased values flow from a setup invocation into the failing call via
/// the result binding, not a reconstruction.
#[tokio::test]
async fn aliased_setup_result_feeds_the_failing_call() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::main",
            MockEventFeed::new(fixtures::aliased_connection()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    let artifacts = result.artifacts.expect("artifacts written");
    let source = std::fs::read_to_string(&artifacts.source_path).unwrap();
    assert!(source.contains("let r1 = app::setup();"));
    assert!(source.contains("app::send(r1)"));
}

/// A diverging replay yields NotReproduced with the observed delta.
#[tokio::test]
async fn diverging_outcome_is_not_reproduced() {
    let dir = tempdir().unwrap();
    let orchestrator = SessionOrchestrator::new(
        config(dir.path()),
        Arc::new(MockHarness::failing(
            "thread 'reproduces_div' panicked: unexpected failure: Overflow",
        )),
    );
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::DIVIDE_BY_ZERO.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert!(matches!(
        result.verdict,
        Some(VerificationVerdict::NotReproduced { ref reason })
            if reason.contains("DivideByZero") && reason.contains("Overflow")
    ));
}

/// Compilation failures surface their diagnostics without crashing the
/// session.
#[tokio::test]
async fn compilation_failure_is_terminal_but_not_fatal() {
    let dir = tempdir().unwrap();
    let orchestrator = SessionOrchestrator::new(
        config(dir.path()),
        Arc::new(MockHarness::compile_error(vec![
            "error[E0308]: mismatched types".to_string(),
        ])),
    );
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::DIVIDE_BY_ZERO.clone()),
        )
        .await;

    assert_eq!(result.state, TerminalState::Done);
    assert!(matches!(
        result.verdict,
        Some(VerificationVerdict::CompilationFailed { ref diagnostics })
            if diagnostics.len() == 1
    ));
}

/// Verification timeouts map to NotReproduced("timeout").
#[tokio::test]
async fn verification_timeout_is_not_reproduced() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::timing_out()));
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::DIVIDE_BY_ZERO.clone()),
        )
        .await;

    assert_eq!(
        result.verdict,
        Some(VerificationVerdict::NotReproduced {
            reason: "timeout".to_string()
        })
    );
}

/// The session result serializes with a flat terminal state for the front
/// end.
#[tokio::test]
async fn session_result_serializes_flat_state() {
    let dir = tempdir().unwrap();
    let orchestrator =
        SessionOrchestrator::new(config(dir.path()), Arc::new(MockHarness::passing()));
    let result = orchestrator
        .run(
            "app::math::div",
            MockEventFeed::new(fixtures::DIVIDE_BY_ZERO.clone()),
        )
        .await;

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["state"], "done");
    assert_eq!(json["verdict"]["verdict"], "reproduced");
    assert_eq!(json["trace_size"], 1);
}

//! The verification oracle: run the generated test, compare outcomes.

use std::sync::Arc;

use crate::codegen::statement::{ExpectedOutcome, GeneratedTest};
use crate::verify::harness::TestHarness;
use crate::verify::verdict::VerificationVerdict;

/// Runs generated tests through a harness and maps execution reports to
/// verdicts. Harness trouble becomes a verdict, never a crash.
pub struct VerificationRunner {
    harness: Arc<dyn TestHarness>,
}

impl VerificationRunner {
    pub fn new(harness: Arc<dyn TestHarness>) -> Self {
        Self { harness }
    }

    pub async fn verify(&self, test: &GeneratedTest) -> VerificationVerdict {
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return VerificationVerdict::NotReproduced {
                    reason: format!("could not create scratch directory: {e}"),
                }
            }
        };

        let report = match self.harness.run(test, scratch.path()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(test = %test.name, error = %e, "harness failed");
                return VerificationVerdict::NotReproduced {
                    reason: format!("harness error: {e}"),
                };
            }
        };

        if !report.compiled {
            return VerificationVerdict::CompilationFailed {
                diagnostics: report.diagnostics,
            };
        }
        if report.timed_out {
            return VerificationVerdict::NotReproduced {
                reason: "timeout".to_string(),
            };
        }
        if report.test_passed {
            if test.manifest.is_structural() {
                let substituted: Vec<String> = test
                    .manifest
                    .stubs
                    .iter()
                    .map(|s| s.type_name.clone())
                    .collect();
                return VerificationVerdict::PartiallyReproduced {
                    reason: format!("stub substitutions: {}", substituted.join(", ")),
                };
            }
            return VerificationVerdict::Reproduced;
        }

        VerificationVerdict::NotReproduced {
            reason: outcome_delta(&test.expected, report.failure_output.as_deref()),
        }
    }
}

fn outcome_delta(expected: &ExpectedOutcome, observed: Option<&str>) -> String {
    let expectation = match expected {
        ExpectedOutcome::Returns { value: Some(value) } => format!("return of {value}"),
        ExpectedOutcome::Returns { value: None } => "normal return".to_string(),
        ExpectedOutcome::Panics { error_kind, .. } => format!("failure of kind {error_kind}"),
    };
    match observed {
        Some(output) => format!("expected {expectation}; observed: {output}"),
        None => format!("expected {expectation}; no failure output captured"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::statement::{GeneratedTest, StubSubstitution, TestManifest};
    use crate::trace::value::ValueIdentity;
    use crate::verify::mock::MockHarness;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_unit(stubs: Vec<StubSubstitution>) -> GeneratedTest {
        GeneratedTest {
            name: "reproduces_div".to_string(),
            statements: vec![],
            source: "// test\n".to_string(),
            expected: ExpectedOutcome::Panics {
                error_kind: "DivideByZero".to_string(),
                message: None,
            },
            manifest: TestManifest {
                test_name: "reproduces_div".to_string(),
                session_id: Uuid::nil(),
                generated_at: Utc::now(),
                failure_target: "app::div".to_string(),
                stubs,
            },
        }
    }

    fn stub() -> StubSubstitution {
        StubSubstitution {
            identity: ValueIdentity(3),
            type_name: "std::fs::File".to_string(),
            reason: "open file handle".to_string(),
            binding: Some("v3".to_string()),
        }
    }

    #[tokio::test]
    async fn clean_pass_is_reproduced() {
        let runner = VerificationRunner::new(Arc::new(MockHarness::passing()));
        let verdict = runner.verify(&test_unit(vec![])).await;
        assert_eq!(verdict, VerificationVerdict::Reproduced);
    }

    #[tokio::test]
    async fn pass_with_stubs_is_partial() {
        let runner = VerificationRunner::new(Arc::new(MockHarness::passing()));
        let verdict = runner.verify(&test_unit(vec![stub()])).await;
        assert!(matches!(
            verdict,
            VerificationVerdict::PartiallyReproduced { ref reason } if reason.contains("std::fs::File")
        ));
    }

    #[tokio::test]
    async fn failed_run_reports_the_delta() {
        let runner = VerificationRunner::new(Arc::new(MockHarness::failing(
            "panicked at: unexpected failure: Overflow",
        )));
        let verdict = runner.verify(&test_unit(vec![])).await;
        assert!(matches!(
            verdict,
            VerificationVerdict::NotReproduced { ref reason }
                if reason.contains("DivideByZero") && reason.contains("Overflow")
        ));
    }

    #[tokio::test]
    async fn compile_failure_carries_diagnostics() {
        let runner = VerificationRunner::new(Arc::new(MockHarness::compile_error(vec![
            "error[E0308]: mismatched types".to_string(),
        ])));
        let verdict = runner.verify(&test_unit(vec![])).await;
        assert!(matches!(
            verdict,
            VerificationVerdict::CompilationFailed { ref diagnostics } if diagnostics.len() == 1
        ));
    }

    #[tokio::test]
    async fn timeout_is_not_reproduced() {
        let runner = VerificationRunner::new(Arc::new(MockHarness::timing_out()));
        let verdict = runner.verify(&test_unit(vec![])).await;
        assert_eq!(
            verdict,
            VerificationVerdict::NotReproduced {
                reason: "timeout".to_string()
            }
        );
    }

    #[tokio::test]
    async fn harness_errors_become_verdicts() {
        let harness = Arc::new(MockHarness::erroring("cargo not found"));
        let runs = harness.runs_handle();
        let runner = VerificationRunner::new(harness);
        let verdict = runner.verify(&test_unit(vec![])).await;
        assert!(matches!(
            verdict,
            VerificationVerdict::NotReproduced { ref reason } if reason.contains("cargo not found")
        ));
        assert_eq!(runs.lock().len(), 1);
    }
}

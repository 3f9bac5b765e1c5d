//! Generated-source snapshots for fixed slices.

use retrace::analyzer::Analyzer;
use retrace::capture::{CaptureSession, RawEvent};
use retrace::codegen::TestGenerator;
use retrace::trace::Trace;

use super::common::fixtures;

fn capture(events: &[RawEvent]) -> Trace {
    let mut session = CaptureSession::begin("fixture");
    for event in events {
        session.on_event(event.clone());
    }
    session.end()
}

#[test]
fn divide_by_zero_source_snapshot() {
    let trace = capture(&fixtures::DIVIDE_BY_ZERO);
    let slice = Analyzer::new().analyze_designated(&trace).unwrap();
    let test = TestGenerator::new().generate(&slice).unwrap();

    insta::assert_snapshot!(test.source, @r##"
    // Automatically generated regression test for app::math::div.
    // Derived from a recorded execution; regenerate from the session tape
    // instead of editing by hand.

    #[test]
    fn reproduces_div() {
        let v1 = 10i64;
        let v2 = 0i64;
        let failure_0 = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| { app::math::div(v1, v2); }))
            .expect_err("expected app::math::div to fail");
        let failure_0_message = panic_message(&failure_0);
        assert!(failure_0_message.contains("DivideByZero"), "unexpected failure: {failure_0_message}");
    }

    fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
        if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        }
    }
    "##);
}

#[test]
fn generated_source_is_deterministic() {
    let trace = capture(&fixtures::PASS_THROUGH_CHAIN);
    let slice = Analyzer::new().analyze_designated(&trace).unwrap();
    let generator = TestGenerator::new();

    let first = generator.generate(&slice).unwrap();
    let second = generator.generate(&slice).unwrap();
    assert_eq!(first.source, second.source);
    assert_eq!(first.name, second.name);
}

#[test]
fn stubbed_source_carries_the_stub_helper() {
    let trace = capture(&fixtures::OPEN_FILE_HANDLE);
    let slice = Analyzer::new().analyze_designated(&trace).unwrap();
    let test = TestGenerator::new().generate(&slice).unwrap();

    assert!(test.source.contains("let v3 = stub::<std::fs::File>();"));
    assert!(test.source.contains("fn stub<T: Default>() -> T"));
    assert!(test.manifest.is_structural());
}

//! Property tests for trace capture and analysis.

use proptest::prelude::*;

use retrace::analyzer::{is_locally_minimal, Analyzer};
use retrace::capture::mock::snap;
use retrace::capture::{CaptureSession, RawError, RawEvent};
use retrace::trace::{ActivationId, TargetId, Trace, ValueShape};

/// Interpret a byte script into a well-nested event stream on one
/// activation. Values alias earlier identities when the opcode says so,
/// which exercises the analyzer's dependency checks.
fn build_events(ops: &[u8]) -> Vec<RawEvent> {
    let mut events = Vec::new();
    let mut depth = 0usize;
    let mut next_identity: u64 = 1;
    let mut next_target = 0usize;
    let activation = || ActivationId::from_string("main");

    for &op in ops {
        match op % 4 {
            0 | 3 => {
                // Enter; odd opcodes in the upper range alias an earlier
                // identity instead of allocating a fresh one.
                let identity = if op >= 8 && next_identity > 1 {
                    (u64::from(op) % (next_identity - 1)) + 1
                } else {
                    let fresh = next_identity;
                    next_identity += 1;
                    fresh
                };
                events.push(RawEvent::Enter {
                    activation: activation(),
                    target: TargetId::new(format!("app::f{next_target}"), "(i64)"),
                    receiver: None,
                    arguments: vec![snap(identity, ValueShape::int(identity as i64))],
                });
                next_target += 1;
                depth += 1;
            }
            1 if depth > 0 => {
                let identity = next_identity;
                next_identity += 1;
                events.push(RawEvent::Exit {
                    activation: activation(),
                    return_value: Some(snap(identity, ValueShape::int(identity as i64))),
                });
                depth -= 1;
            }
            2 if depth > 0 => {
                events.push(RawEvent::Throw {
                    activation: activation(),
                    error: RawError {
                        kind: "Boom".to_string(),
                        message: None,
                        value: None,
                    },
                });
                depth -= 1;
            }
            _ => {}
        }
    }
    for _ in 0..depth {
        events.push(RawEvent::Exit {
            activation: activation(),
            return_value: None,
        });
    }
    events
}

fn capture(events: &[RawEvent]) -> Trace {
    let mut session = CaptureSession::begin("property");
    for event in events {
        session.on_event(event.clone());
    }
    session.end()
}

proptest! {
    /// Re-deriving a trace from the same event stream yields an identical
    /// trace (modulo the random session id).
    #[test]
    fn rederivation_is_idempotent(ops in prop::collection::vec(0u8..12, 0..40)) {
        let events = build_events(&ops);
        let first = capture(&events);
        let second = capture(&events);

        prop_assert_eq!(first.records(), second.records());
        prop_assert_eq!(first.roots(), second.roots());
        prop_assert_eq!(first.values(), second.values());
        prop_assert_eq!(first.failure_point(), second.failure_point());
    }

    /// Parent-child ordering matches start-time ordering: every parent id
    /// precedes its children's ids.
    #[test]
    fn parents_start_before_children(ops in prop::collection::vec(0u8..12, 0..40)) {
        let trace = capture(&build_events(&ops));
        for record in trace.records() {
            if let Some(parent) = record.parent {
                prop_assert!(parent < record.id);
            }
            for child in &record.children {
                prop_assert!(*child > record.id);
            }
        }
    }

    /// Analysis is deterministic and its slices are locally minimal.
    #[test]
    fn analysis_is_idempotent_and_minimal(ops in prop::collection::vec(0u8..12, 0..40)) {
        let trace = capture(&build_events(&ops));
        if trace.failure_point().is_none() {
            return Ok(());
        }

        let analyzer = Analyzer::new();
        let first = analyzer.analyze_designated(&trace).unwrap();
        let second = analyzer.analyze_designated(&trace).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert!(is_locally_minimal(&trace, &first));
    }
}

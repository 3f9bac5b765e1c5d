//! Probe-event scripts for the reference failure scenarios.

use std::path::Path;

use once_cell::sync::Lazy;

use retrace::capture::mock::{snap, FeedScriptBuilder};
use retrace::capture::tape::{EventTape, TapeEntry};
use retrace::capture::RawEvent;
use retrace::trace::{ValueIdentity, ValueShape};

/// A single root invocation that throws immediately.
pub static DIVIDE_BY_ZERO: Lazy<Vec<RawEvent>> = Lazy::new(|| {
    FeedScriptBuilder::new()
        .enter(
            "app::math::div",
            vec![snap(1, ValueShape::int(10)), snap(2, ValueShape::int(0))],
        )
        .throw("DivideByZero", Some("attempt to divide by zero"))
        .build()
});

/// f calls g(x) which calls h(x); only h throws; g only forwards x.
pub static PASS_THROUGH_CHAIN: Lazy<Vec<RawEvent>> = Lazy::new(|| {
    FeedScriptBuilder::new()
        .enter("app::f", vec![])
        .enter("app::g", vec![snap(1, ValueShape::int(3))])
        .enter("app::h", vec![snap(1, ValueShape::int(3))])
        .throw("DivideByZero", Some("x was zero"))
        .exit_unit()
        .exit_unit()
        .build()
});

/// The failing invocation holds an open file handle, which capture marked
/// unrepresentable.
pub static OPEN_FILE_HANDLE: Lazy<Vec<RawEvent>> = Lazy::new(|| {
    FeedScriptBuilder::new()
        .enter(
            "app::read_header",
            vec![snap(
                3,
                ValueShape::Unrepresentable {
                    type_name: "std::fs::File".to_string(),
                    reason: "open file handle".to_string(),
                },
            )],
        )
        .throw("UnexpectedEof", None)
        .build()
});

/// A malformed feed: a stray exit on another activation, disjoint from the
/// failing subtree.
pub static STRAY_EXIT_THEN_FAILURE: Lazy<Vec<RawEvent>> = Lazy::new(|| {
    FeedScriptBuilder::new()
        .on_activation("worker")
        .exit_unit()
        .on_activation("main")
        .enter(
            "app::math::div",
            vec![snap(1, ValueShape::int(10)), snap(2, ValueShape::int(0))],
        )
        .throw("DivideByZero", Some("attempt to divide by zero"))
        .build()
});

/// Aliasing scenario: setup() returns a connection that the failing call
/// receives by reference.
pub fn aliased_connection() -> Vec<RawEvent> {
    FeedScriptBuilder::new()
        .enter("app::main", vec![])
        .enter("app::setup", vec![])
        .exit_value(snap(
            7,
            ValueShape::Composite {
                type_name: "Conn".to_string(),
                fields: vec![],
            },
        ))
        .enter(
            "app::send",
            vec![snap(
                8,
                ValueShape::Ref {
                    identity: ValueIdentity(7),
                },
            )],
        )
        .throw("ConnectionReset", None)
        .exit_unit()
        .build()
}

/// Write events to a tape file usable by the CLI.
pub fn write_tape(path: &Path, events: &[RawEvent]) {
    let mut tape = EventTape::new();
    for (idx, event) in events.iter().enumerate() {
        tape.entries.push(TapeEntry {
            seq: (idx + 1) as u64,
            ts_ms: idx as u64,
            event: event.clone(),
        });
    }
    tape.write_jsonl_to_path(path).expect("tape fixture written");
}

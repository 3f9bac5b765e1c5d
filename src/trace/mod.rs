//! Typed, immutable representation of one captured execution.

pub mod model;
pub mod record;
pub mod value;

pub use model::{CaptureIncident, Trace, TraceSummary};
pub use record::{
    ActivationId, ErrorSnapshot, InvocationId, InvocationOutcome, InvocationRecord, TargetId,
};
pub use value::{
    FieldValue, PrimitiveValue, ValueIdentity, ValueRef, ValueShape, ValueSnapshot, ValueTable,
};

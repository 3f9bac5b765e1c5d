//! Invocation records: one observed call and its terminal outcome.

use serde::{Deserialize, Serialize};

use crate::trace::value::ValueRef;

/// Index of an invocation in the trace arena.
///
/// Ids are assigned monotonically at enter time, so ordering by id is
/// ordering by start time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InvocationId(pub u64);

impl InvocationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the invoked operation as recorded by the instrumentation.
///
/// Opaque to the core: the qualified name and signature are never inspected
/// beyond display and code emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub qualified_name: String,
    pub signature: String,
}

impl TargetId {
    pub fn new(qualified_name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            signature: signature.into(),
        }
    }

    /// Last path segment of the qualified name.
    pub fn short_name(&self) -> &str {
        self.qualified_name
            .rsplit("::")
            .next()
            .unwrap_or(&self.qualified_name)
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.qualified_name, self.signature)
    }
}

/// Thread/activation context identifier carried on every raw event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationId(String);

impl ActivationId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActivationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recorded error outcome of a thrown invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    /// Qualified kind of the error (exception class, panic type).
    pub kind: String,
    pub message: Option<String>,
    /// Snapshot of the error value itself, when the probe could capture one.
    pub value: Option<ValueRef>,
}

impl ErrorSnapshot {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            value: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_value(mut self, value: ValueRef) -> Self {
        self.value = Some(value);
        self
    }
}

/// Terminal outcome of an invocation.
///
/// `Incomplete` marks invocations still open at session end or belonging to
/// a malformed subtree; they are excluded from slicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// Normal return; `value` is absent for unit/void targets.
    Returned { value: Option<ValueRef> },
    Threw { error: ErrorSnapshot },
    Incomplete,
}

impl InvocationOutcome {
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Incomplete)
    }

    pub fn threw(&self) -> bool {
        matches!(self, Self::Threw { .. })
    }
}

/// One call observed during capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: InvocationId,
    pub target: TargetId,
    pub activation: ActivationId,
    pub receiver: Option<ValueRef>,
    pub arguments: Vec<ValueRef>,
    pub outcome: InvocationOutcome,
    /// Nested calls in call order.
    pub children: Vec<InvocationId>,
    /// Weak back-reference for slicing traversal.
    pub parent: Option<InvocationId>,
}

impl InvocationRecord {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_complete()
    }

    /// Every value reference this record carries: receiver, arguments, and
    /// the outcome's return or error value.
    pub fn value_refs(&self) -> Vec<ValueRef> {
        let mut refs = Vec::with_capacity(self.arguments.len() + 2);
        if let Some(receiver) = self.receiver {
            refs.push(receiver);
        }
        refs.extend(self.arguments.iter().copied());
        match &self.outcome {
            InvocationOutcome::Returned { value } => refs.extend(value.iter().copied()),
            InvocationOutcome::Threw { error } => {
                if let Some(value) = error.value {
                    refs.push(value);
                }
            }
            InvocationOutcome::Incomplete => {}
        }
        refs
    }
}

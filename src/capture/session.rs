//! Builds a trace incrementally from the raw event stream.

use std::collections::HashMap;

use uuid::Uuid;

use crate::capture::feed::{RawError, RawEvent};
use crate::trace::model::{CaptureIncident, Trace};
use crate::trace::record::{
    ActivationId, ErrorSnapshot, InvocationId, InvocationOutcome, InvocationRecord,
};
use crate::trace::value::{ValueRef, ValueSnapshot, ValueTable};

/// Capture-side knobs. Queue capacity bounds the pump channel so a slow
/// consumer backpressures the feed, never the target's business logic.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// One in-progress capture session.
///
/// Maintains a call stack per activation context. `on_event` never fails:
/// well-nesting violations become [`CaptureIncident`]s on the trace and the
/// session keeps going.
pub struct CaptureSession {
    session_id: Uuid,
    target: String,
    records: Vec<InvocationRecord>,
    roots: Vec<InvocationId>,
    values: ValueTable,
    stacks: HashMap<ActivationId, Vec<InvocationId>>,
    failure_point: Option<InvocationId>,
    incidents: Vec<CaptureIncident>,
    cancelled: bool,
}

impl CaptureSession {
    /// Start a session for the named target program.
    pub fn begin(target: impl Into<String>) -> Self {
        let session_id = Uuid::new_v4();
        let target = target.into();
        tracing::info!(session = %session_id, target = %target, "capture session started");
        Self {
            session_id,
            target,
            records: Vec::new(),
            roots: Vec::new(),
            values: ValueTable::new(),
            stacks: HashMap::new(),
            failure_point: None,
            incidents: Vec::new(),
            cancelled: false,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Ignore all further events. Best-effort and immediate.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Consume one probe event, in emission order for its activation.
    pub fn on_event(&mut self, event: RawEvent) {
        if self.cancelled {
            return;
        }
        match event {
            RawEvent::Enter {
                activation,
                target,
                receiver,
                arguments,
            } => self.on_enter(activation, target, receiver, arguments),
            RawEvent::Exit {
                activation,
                return_value,
            } => self.on_exit(activation, return_value),
            RawEvent::Throw { activation, error } => self.on_throw(activation, error),
        }
    }

    fn on_enter(
        &mut self,
        activation: ActivationId,
        target: crate::trace::record::TargetId,
        receiver: Option<ValueSnapshot>,
        arguments: Vec<ValueSnapshot>,
    ) {
        let id = InvocationId(self.records.len() as u64);
        let receiver = receiver.map(|s| self.values.record(s));
        let arguments: Vec<ValueRef> = arguments
            .into_iter()
            .map(|s| self.values.record(s))
            .collect();

        let stack = self.stacks.entry(activation.clone()).or_default();
        let parent = stack.last().copied();
        stack.push(id);

        if let Some(parent_id) = parent {
            self.records[parent_id.index()].children.push(id);
        } else {
            self.roots.push(id);
        }

        self.records.push(InvocationRecord {
            id,
            target,
            activation,
            receiver,
            arguments,
            outcome: InvocationOutcome::Incomplete,
            children: Vec::new(),
            parent,
        });
    }

    fn on_exit(&mut self, activation: ActivationId, return_value: Option<ValueSnapshot>) {
        let Some(id) = self.pop_open(&activation, "exit") else {
            return;
        };
        let value = return_value.map(|s| self.values.record(s));
        self.records[id.index()].outcome = InvocationOutcome::Returned { value };
    }

    fn on_throw(&mut self, activation: ActivationId, error: RawError) {
        let Some(id) = self.pop_open(&activation, "throw") else {
            return;
        };
        let value = error.value.map(|s| self.values.record(s));
        let mut snapshot = ErrorSnapshot::new(error.kind);
        snapshot.message = error.message;
        snapshot.value = value;
        self.records[id.index()].outcome = InvocationOutcome::Threw { error: snapshot };

        // Pop order means the innermost throw wins: the failure origin.
        if self.failure_point.is_none() {
            self.failure_point = Some(id);
            tracing::debug!(invocation = %id, "failure point designated");
        }
    }

    /// Pop the open invocation for `activation`, or record an incident when
    /// the stream is malformed (exit/throw with no matching enter).
    fn pop_open(&mut self, activation: &ActivationId, event_kind: &str) -> Option<InvocationId> {
        match self.stacks.get_mut(activation).and_then(Vec::pop) {
            Some(id) => Some(id),
            None => {
                tracing::warn!(
                    activation = %activation,
                    "{event_kind} event with no open invocation; subtree excluded"
                );
                self.incidents.push(CaptureIncident {
                    activation: activation.clone(),
                    detail: format!("{event_kind} event with no matching open invocation"),
                });
                None
            }
        }
    }

    /// Close any still-open invocations as incomplete and freeze the trace.
    pub fn end(mut self) -> Trace {
        for (activation, stack) in self.stacks.iter() {
            for id in stack {
                self.incidents.push(CaptureIncident {
                    activation: activation.clone(),
                    detail: format!("invocation {id} still open at session end"),
                });
            }
        }

        tracing::info!(
            session = %self.session_id,
            invocations = self.records.len(),
            incidents = self.incidents.len(),
            "capture session ended"
        );

        Trace::new(
            self.session_id,
            self.records,
            self.roots,
            self.values,
            self.failure_point,
            self.incidents,
        )
    }
}

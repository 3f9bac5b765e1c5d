//! The frozen trace: arena of invocation records plus the value table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::record::{ActivationId, InvocationId, InvocationRecord};
use crate::trace::value::ValueTable;

/// A capture incident recorded while the session ran: the event stream
/// violated well-nesting and the affected part of the trace was excluded
/// from slicing instead of crashing the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureIncident {
    pub activation: ActivationId,
    pub detail: String,
}

/// One captured execution, frozen at session end.
///
/// Built exclusively by the capture session; every consumer afterwards sees
/// it read-only. Records form a forest ordered by start time, ids consistent
/// with that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    session_id: Uuid,
    records: Vec<InvocationRecord>,
    roots: Vec<InvocationId>,
    values: ValueTable,
    failure_point: Option<InvocationId>,
    incidents: Vec<CaptureIncident>,
}

impl Trace {
    pub(crate) fn new(
        session_id: Uuid,
        records: Vec<InvocationRecord>,
        roots: Vec<InvocationId>,
        values: ValueTable,
        failure_point: Option<InvocationId>,
        incidents: Vec<CaptureIncident>,
    ) -> Self {
        Self {
            session_id,
            records,
            roots,
            values,
            failure_point,
            incidents,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record(&self, id: InvocationId) -> Option<&InvocationRecord> {
        self.records.get(id.index())
    }

    pub fn records(&self) -> &[InvocationRecord] {
        &self.records
    }

    pub fn roots(&self) -> &[InvocationId] {
        &self.roots
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn failure_point(&self) -> Option<InvocationId> {
        self.failure_point
    }

    pub fn incidents(&self) -> &[CaptureIncident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Path from the owning root down to `id`, inclusive.
    pub fn path_from_root(&self, id: InvocationId) -> Vec<InvocationId> {
        let mut path = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.record(current).and_then(|r| r.parent);
        }
        path.reverse();
        path
    }

    /// All ids in the subtree rooted at `id`, in start-time order.
    pub fn subtree(&self, id: InvocationId) -> Vec<InvocationId> {
        let mut ids = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            ids.push(current);
            if let Some(record) = self.record(current) {
                // Reverse so the stack pops children in call order.
                pending.extend(record.children.iter().rev().copied());
            }
        }
        ids.sort_unstable();
        ids
    }

    pub fn is_ancestor(&self, ancestor: InvocationId, descendant: InvocationId) -> bool {
        let mut cursor = self.record(descendant).and_then(|r| r.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.record(current).and_then(|r| r.parent);
        }
        false
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            session_id: self.session_id,
            invocations: self.records.len(),
            roots: self.roots.len(),
            identities: self.values.identity_count(),
            snapshots: self.values.snapshot_count(),
            failure_point: self.failure_point,
            incidents: self.incidents.len(),
        }
    }
}

/// Compact description of a trace, for the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub session_id: Uuid,
    pub invocations: usize,
    pub roots: usize,
    pub identities: usize,
    pub snapshots: usize,
    pub failure_point: Option<InvocationId>,
    pub incidents: usize,
}

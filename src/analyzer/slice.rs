//! The analyzer's output: a minimal reproduction slice.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::record::{InvocationId, InvocationRecord};
use crate::trace::value::{ValueRef, ValueTable};

/// Minimal ordered subset of a trace sufficient to reconstruct its failure:
/// the failure point, its call context, every invocation whose recorded
/// values the reconstruction depends on, and the value histories they reach.
///
/// Carries cloned records and a value-table subset so downstream consumers
/// never reach back into the trace. Created once per analysis run; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionSlice {
    session_id: Uuid,
    invocations: Vec<InvocationRecord>,
    values: ValueTable,
    failure_point: InvocationId,
    stubbed: Vec<ValueRef>,
}

impl ReproductionSlice {
    pub(crate) fn new(
        session_id: Uuid,
        invocations: Vec<InvocationRecord>,
        values: ValueTable,
        failure_point: InvocationId,
        stubbed: Vec<ValueRef>,
    ) -> Self {
        Self {
            session_id,
            invocations,
            values,
            failure_point,
            stubbed,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Retained records in original call order.
    pub fn invocations(&self) -> &[InvocationRecord] {
        &self.invocations
    }

    pub fn ids(&self) -> Vec<InvocationId> {
        self.invocations.iter().map(|r| r.id).collect()
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn failure_point(&self) -> InvocationId {
        self.failure_point
    }

    pub fn failure_record(&self) -> Option<&InvocationRecord> {
        self.invocations
            .iter()
            .find(|r| r.id == self.failure_point)
    }

    /// References resolving to unrepresentable values; the test generator
    /// substitutes a stub for each and records it in the manifest.
    pub fn stubbed(&self) -> &[ValueRef] {
        &self.stubbed
    }

    pub fn contains(&self, id: InvocationId) -> bool {
        self.invocations.binary_search_by_key(&id, |r| r.id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

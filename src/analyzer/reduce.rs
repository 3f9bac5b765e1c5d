//! Fixed-point reduction of a trace to its reproduction slice.
//!
//! The candidate slice starts as the root→failure-point path. Invocations
//! outside the path are retained only when they recorded a snapshot of an
//! identity the retained set's referenced-value closure depends on; when
//! several could satisfy the same identity, the earliest id wins. The pass
//! repeats until the closure stops growing, then a backwards sweep drops
//! anything whose removal leaves the closure fully covered.
//!
//! All checks are pure lookups against the frozen value table; nothing is
//! re-executed.

use std::collections::{BTreeMap, BTreeSet};

use crate::analyzer::slice::ReproductionSlice;
use crate::trace::model::Trace;
use crate::trace::record::{InvocationId, InvocationRecord};
use crate::trace::value::{ValueIdentity, ValueRef};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    /// Trace captured a non-failure baseline: nothing to reproduce.
    #[error("trace has no designated failure point")]
    NoFailurePoint,

    /// The designated failure point belongs to a malformed or unfinished
    /// subtree and cannot anchor a slice.
    #[error("failure point {0} is marked incomplete")]
    IncompleteFailurePoint(InvocationId),

    #[error("failure point {0} is not part of the trace")]
    UnknownFailurePoint(InvocationId),
}

/// Computes reproduction slices from frozen traces.
///
/// Deterministic and idempotent: the same `(trace, failure_point)` input
/// always yields the same slice.
#[derive(Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze against the trace's own designated failure point.
    pub fn analyze_designated(&self, trace: &Trace) -> Result<ReproductionSlice, AnalyzeError> {
        let failure_point = trace.failure_point().ok_or(AnalyzeError::NoFailurePoint)?;
        self.analyze(trace, failure_point)
    }

    pub fn analyze(
        &self,
        trace: &Trace,
        failure_point: InvocationId,
    ) -> Result<ReproductionSlice, AnalyzeError> {
        let fp_record = trace
            .record(failure_point)
            .ok_or(AnalyzeError::UnknownFailurePoint(failure_point))?;
        if !fp_record.is_complete() {
            return Err(AnalyzeError::IncompleteFailurePoint(failure_point));
        }

        let path: BTreeSet<InvocationId> = trace.path_from_root(failure_point).into_iter().collect();
        let definers = definer_index(trace);

        let mut retained = path.clone();
        let mut unsatisfiable: BTreeSet<ValueIdentity> = BTreeSet::new();
        let mut passes = 0usize;

        // Grow to a fixed point: retain the earliest complete definer for
        // every closure identity the retained set does not yet cover.
        loop {
            passes += 1;
            let closure = referenced_closure(trace, &retained);
            let covered = defined_identities(trace, &retained);
            let uncovered: Vec<ValueIdentity> = closure
                .difference(&covered)
                .filter(|id| !unsatisfiable.contains(id))
                .copied()
                .collect();

            if uncovered.is_empty() {
                break;
            }

            for identity in uncovered {
                match definers.get(&identity).and_then(|ids| ids.first()) {
                    Some(&definer) => {
                        for ancestor in trace.path_from_root(definer) {
                            retained.insert(ancestor);
                        }
                    }
                    None => {
                        // Only incomplete subtrees observed this identity; a
                        // capture limitation, not a slicing failure.
                        tracing::warn!(%identity, "no complete invocation defines identity");
                        unsatisfiable.insert(identity);
                    }
                }
            }
        }

        // Shrink, latest first. Non-path subtrees are dropped wholesale when
        // their removal leaves the referenced closure covered. Path nodes
        // between the root and the failure point are dropped individually
        // when they contribute nothing beyond passing values through (the
        // root stays as outermost context, the failure point always stays).
        let root = path.iter().next().copied().unwrap_or(failure_point);
        loop {
            let mut changed = false;
            let sweep: Vec<InvocationId> = retained
                .iter()
                .rev()
                .copied()
                .filter(|id| *id != root && *id != failure_point)
                .collect();
            for candidate in sweep {
                if !retained.contains(&candidate) {
                    continue;
                }
                let removal: BTreeSet<InvocationId> = if path.contains(&candidate) {
                    [candidate].into()
                } else {
                    trace
                        .subtree(candidate)
                        .into_iter()
                        .filter(|id| retained.contains(id))
                        .collect()
                };
                let tentative: BTreeSet<InvocationId> =
                    retained.difference(&removal).copied().collect();

                let closure = referenced_closure(trace, &tentative);
                let covered = defined_identities(trace, &tentative);
                if closure
                    .difference(&covered)
                    .all(|id| unsatisfiable.contains(id))
                {
                    retained = tentative;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        tracing::debug!(
            failure_point = %failure_point,
            retained = retained.len(),
            total = trace.len(),
            passes,
            "analysis reduced trace"
        );

        let closure = referenced_closure(trace, &retained);
        let ids: Vec<InvocationId> = retained.iter().copied().collect();
        let stubbed = stubbed_refs(trace, &ids);
        let invocations: Vec<InvocationRecord> = ids
            .iter()
            .filter_map(|id| trace.record(*id))
            .cloned()
            .collect();

        Ok(ReproductionSlice::new(
            trace.session_id(),
            invocations,
            trace.values().subset(&closure),
            failure_point,
            stubbed,
        ))
    }
}

/// True if removing any single retained invocation outside the failure
/// point's ancestry would leave the referenced-value closure covered.
/// Produced slices must never fail this.
pub fn is_locally_minimal(trace: &Trace, slice: &ReproductionSlice) -> bool {
    let path: BTreeSet<InvocationId> = trace
        .path_from_root(slice.failure_point())
        .into_iter()
        .collect();
    let retained: BTreeSet<InvocationId> = slice.ids().into_iter().collect();

    for candidate in slice.ids() {
        if path.contains(&candidate) {
            continue;
        }
        let removal: BTreeSet<InvocationId> = trace
            .subtree(candidate)
            .into_iter()
            .filter(|id| retained.contains(id))
            .collect();
        let tentative: BTreeSet<InvocationId> = retained.difference(&removal).copied().collect();

        let closure = referenced_closure(trace, &tentative);
        let covered = defined_identities(trace, &tentative);
        if closure.is_subset(&covered) {
            return false;
        }
    }
    true
}

/// identity → complete invocations that recorded a snapshot of it, in id
/// order (so `.first()` is the earliest, the tie-break winner).
fn definer_index(trace: &Trace) -> BTreeMap<ValueIdentity, Vec<InvocationId>> {
    let mut index: BTreeMap<ValueIdentity, Vec<InvocationId>> = BTreeMap::new();
    for record in trace.records() {
        if !record.is_complete() {
            continue;
        }
        for value_ref in record.value_refs() {
            let ids = index.entry(value_ref.identity).or_default();
            if ids.last() != Some(&record.id) {
                ids.push(record.id);
            }
        }
    }
    index
}

fn record_refs(record: &InvocationRecord) -> impl Iterator<Item = ValueRef> + '_ {
    record.value_refs().into_iter()
}

/// Identity closure referenced by the retained records, following
/// reference-to-prior markers through the value table.
fn referenced_closure(trace: &Trace, retained: &BTreeSet<InvocationId>) -> BTreeSet<ValueIdentity> {
    let seeds = retained
        .iter()
        .filter_map(|id| trace.record(*id))
        .flat_map(record_refs)
        .map(|r| r.identity);
    trace.values().ref_closure(seeds)
}

fn defined_identities(
    trace: &Trace,
    retained: &BTreeSet<InvocationId>,
) -> BTreeSet<ValueIdentity> {
    retained
        .iter()
        .filter_map(|id| trace.record(*id))
        .filter(|record| record.is_complete())
        .flat_map(record_refs)
        .map(|r| r.identity)
        .collect()
}

/// References to unrepresentable values, in slice order, deduplicated.
fn stubbed_refs(trace: &Trace, invocations: &[InvocationId]) -> Vec<ValueRef> {
    let mut seen = BTreeSet::new();
    let mut stubbed = Vec::new();
    for id in invocations {
        let Some(record) = trace.record(*id) else {
            continue;
        };
        for value_ref in record.value_refs() {
            if let Some(snapshot) = trace.values().resolve(value_ref) {
                if snapshot.shape.is_unrepresentable() && seen.insert(value_ref) {
                    stubbed.push(value_ref);
                }
            }
        }
    }
    stubbed
}

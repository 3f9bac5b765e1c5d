//! Recorded values: identities, snapshots, and the per-identity history table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Opaque handle identifying one underlying object across snapshots.
///
/// Two snapshots with the same identity denote the same object observed at
/// possibly different times. Equality is aliasing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ValueIdentity(pub u64);

impl std::fmt::Display for ValueIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Reference to one specific snapshot in an identity's history.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ValueRef {
    pub identity: ValueIdentity,
    pub version: u32,
}

impl ValueRef {
    pub fn new(identity: ValueIdentity, version: u32) -> Self {
        Self { identity, version }
    }
}

impl std::fmt::Display for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.identity, self.version)
    }
}

/// A primitive recorded value.
///
/// Floats compare by bit pattern so that a recorded NaN still round-trips
/// through equality checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveValue {
    Unit,
    Bool { value: bool },
    Int { value: i64 },
    Float { value: f64 },
    Str { value: String },
    Bytes {
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
    },
}

impl PartialEq for PrimitiveValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unit, Self::Unit) => true,
            (Self::Bool { value: a }, Self::Bool { value: b }) => a == b,
            (Self::Int { value: a }, Self::Int { value: b }) => a == b,
            (Self::Float { value: a }, Self::Float { value: b }) => a.to_bits() == b.to_bits(),
            (Self::Str { value: a }, Self::Str { value: b }) => a == b,
            (Self::Bytes { value: a }, Self::Bytes { value: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for PrimitiveValue {}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A named field inside a composite shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub shape: ValueShape,
}

/// Structural encoding of a recorded value.
///
/// `Ref` marks both a reference to a previously recorded identity and the
/// revisit marker produced when a cyclic object graph is encoded (the probe
/// replaces revisits with the identity it already emitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueShape {
    Primitive { value: PrimitiveValue },
    Composite {
        type_name: String,
        fields: Vec<FieldValue>,
    },
    Ref { identity: ValueIdentity },
    Unrepresentable {
        type_name: String,
        reason: String,
    },
}

impl ValueShape {
    pub fn primitive(value: PrimitiveValue) -> Self {
        Self::Primitive { value }
    }

    pub fn int(value: i64) -> Self {
        Self::Primitive {
            value: PrimitiveValue::Int { value },
        }
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Primitive {
            value: PrimitiveValue::Str {
                value: value.into(),
            },
        }
    }

    pub fn is_unrepresentable(&self) -> bool {
        matches!(self, Self::Unrepresentable { .. })
    }

    /// Identities this shape refers to, including `Ref` markers nested in
    /// composite fields.
    pub fn referenced_identities(&self) -> Vec<ValueIdentity> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<ValueIdentity>) {
        match self {
            Self::Ref { identity } => out.push(*identity),
            Self::Composite { fields, .. } => {
                for field in fields {
                    field.shape.collect_refs(out);
                }
            }
            Self::Primitive { .. } | Self::Unrepresentable { .. } => {}
        }
    }

    /// True if an unrepresentable value is buried anywhere inside this shape.
    pub fn contains_unrepresentable(&self) -> bool {
        match self {
            Self::Unrepresentable { .. } => true,
            Self::Composite { fields, .. } => {
                fields.iter().any(|f| f.shape.contains_unrepresentable())
            }
            Self::Primitive { .. } | Self::Ref { .. } => false,
        }
    }
}

/// One recorded value at a point in time. Immutable once created; later
/// observations of a mutated object are new snapshots sharing the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSnapshot {
    pub identity: ValueIdentity,
    pub shape: ValueShape,
}

impl ValueSnapshot {
    pub fn new(identity: ValueIdentity, shape: ValueShape) -> Self {
        Self { identity, shape }
    }
}

/// Append-only history table: identity → ordered snapshots.
///
/// Single writer during capture (the capture session); read-only once the
/// trace is frozen, so readers need no locking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueTable {
    histories: BTreeMap<ValueIdentity, Vec<ValueSnapshot>>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot to its identity's history and return the reference
    /// naming it.
    pub fn record(&mut self, snapshot: ValueSnapshot) -> ValueRef {
        let history = self.histories.entry(snapshot.identity).or_default();
        let version = history.len() as u32;
        let identity = snapshot.identity;
        history.push(snapshot);
        ValueRef { identity, version }
    }

    pub fn history(&self, identity: ValueIdentity) -> &[ValueSnapshot] {
        self.histories
            .get(&identity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn resolve(&self, value_ref: ValueRef) -> Option<&ValueSnapshot> {
        self.histories
            .get(&value_ref.identity)
            .and_then(|history| history.get(value_ref.version as usize))
    }

    /// Most recently observed snapshot of an identity.
    pub fn latest(&self, identity: ValueIdentity) -> Option<&ValueSnapshot> {
        self.histories.get(&identity).and_then(|h| h.last())
    }

    /// Reference to the most recently observed snapshot of an identity.
    pub fn latest_ref(&self, identity: ValueIdentity) -> Option<ValueRef> {
        self.histories.get(&identity).map(|h| ValueRef {
            identity,
            version: (h.len() - 1) as u32,
        })
    }

    pub fn identities(&self) -> impl Iterator<Item = ValueIdentity> + '_ {
        self.histories.keys().copied()
    }

    pub fn identity_count(&self) -> usize {
        self.histories.len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    /// Transitive closure of identities reachable from `seeds` by following
    /// `Ref` markers through recorded shapes. A visited set guards against
    /// cyclic reference chains.
    pub fn ref_closure(
        &self,
        seeds: impl IntoIterator<Item = ValueIdentity>,
    ) -> BTreeSet<ValueIdentity> {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<ValueIdentity> = seeds.into_iter().collect();

        while let Some(identity) = pending.pop() {
            if !closure.insert(identity) {
                continue;
            }
            for snapshot in self.history(identity) {
                for referenced in snapshot.shape.referenced_identities() {
                    if !closure.contains(&referenced) {
                        pending.push(referenced);
                    }
                }
            }
        }

        closure
    }

    /// Copy of the table restricted to the given identities, histories
    /// preserved in full so version numbers stay valid.
    pub fn subset(&self, identities: &BTreeSet<ValueIdentity>) -> ValueTable {
        ValueTable {
            histories: self
                .histories
                .iter()
                .filter(|(identity, _)| identities.contains(identity))
                .map(|(identity, history)| (*identity, history.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: u64, shape: ValueShape) -> ValueSnapshot {
        ValueSnapshot::new(ValueIdentity(id), shape)
    }

    #[test]
    fn record_assigns_sequential_versions() {
        let mut table = ValueTable::new();
        let first = table.record(snapshot(1, ValueShape::int(1)));
        let second = table.record(snapshot(1, ValueShape::int(2)));

        assert_eq!(first.version, 0);
        assert_eq!(second.version, 1);
        assert_eq!(table.history(ValueIdentity(1)).len(), 2);
    }

    #[test]
    fn resolve_returns_the_named_version() {
        let mut table = ValueTable::new();
        table.record(snapshot(7, ValueShape::int(10)));
        let second = table.record(snapshot(7, ValueShape::int(20)));

        let resolved = table.resolve(second).unwrap();
        assert_eq!(resolved.shape, ValueShape::int(20));
        assert!(table.resolve(ValueRef::new(ValueIdentity(7), 9)).is_none());
    }

    #[test]
    fn ref_closure_follows_nested_references() {
        let mut table = ValueTable::new();
        table.record(snapshot(1, ValueShape::int(5)));
        table.record(snapshot(
            2,
            ValueShape::Composite {
                type_name: "Pair".to_string(),
                fields: vec![FieldValue {
                    name: "left".to_string(),
                    shape: ValueShape::Ref {
                        identity: ValueIdentity(1),
                    },
                }],
            },
        ));

        let closure = table.ref_closure([ValueIdentity(2)]);
        assert!(closure.contains(&ValueIdentity(1)));
        assert!(closure.contains(&ValueIdentity(2)));
    }

    #[test]
    fn ref_closure_terminates_on_cycles() {
        let mut table = ValueTable::new();
        table.record(snapshot(
            1,
            ValueShape::Ref {
                identity: ValueIdentity(2),
            },
        ));
        table.record(snapshot(
            2,
            ValueShape::Ref {
                identity: ValueIdentity(1),
            },
        ));

        let closure = table.ref_closure([ValueIdentity(1)]);
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn float_equality_is_bit_exact() {
        let nan_a = PrimitiveValue::Float { value: f64::NAN };
        let nan_b = PrimitiveValue::Float { value: f64::NAN };
        assert_eq!(nan_a, nan_b);
    }

    #[test]
    fn shape_roundtrips_through_json() {
        let shape = ValueShape::Composite {
            type_name: "Account".to_string(),
            fields: vec![
                FieldValue {
                    name: "balance".to_string(),
                    shape: ValueShape::int(100),
                },
                FieldValue {
                    name: "owner".to_string(),
                    shape: ValueShape::str("ada"),
                },
            ],
        };

        let json = serde_json::to_string(&shape).unwrap();
        let back: ValueShape = serde_json::from_str(&json).unwrap();
        assert_eq!(shape, back);
    }
}

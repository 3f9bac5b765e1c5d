//! Typed statements of a generated test and its stub manifest.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::record::TargetId;
use crate::trace::value::ValueIdentity;

/// One statement of the generated test, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// `let <binding> = <expr>;` — reconstruction of a recorded value.
    Construct { binding: String, expr: String },

    /// `let <binding> = stub::<T>();` — placeholder for an unrepresentable
    /// value, recorded in the manifest.
    ConstructStub { binding: String, type_name: String },

    /// Plain invocation; `binding` holds the result when the recorded
    /// outcome carried a return value.
    Invoke {
        binding: Option<String>,
        target: TargetId,
        call: String,
    },

    /// Invocation recorded as thrown: the call runs under `catch_unwind`
    /// and the panic payload lands in `failure_binding`.
    InvokePanicking {
        failure_binding: String,
        target: TargetId,
        call: String,
    },

    /// `assert_eq!` between an invocation result and the recorded value.
    AssertReturned { binding: String, expected: String },

    /// Panic-payload match against the recorded error kind.
    AssertThrew {
        failure_binding: String,
        error_kind: String,
    },
}

/// Recorded outcome the verification oracle compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Returns { value: Option<String> },
    Panics {
        error_kind: String,
        message: Option<String>,
    },
}

/// One stub substitution performed during generation.
///
/// `binding` is absent when the unrepresentable value was an observed
/// output: nothing was substituted, but its equality check was skipped and
/// the verdict must degrade the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubSubstitution {
    pub identity: ValueIdentity,
    pub type_name: String,
    pub reason: String,
    pub binding: Option<String>,
}

/// Manifest accompanying a generated test: provenance plus every stub
/// substitution, so verification can distinguish a structural reproduction
/// from a full one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestManifest {
    pub test_name: String,
    pub session_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub failure_target: String,
    pub stubs: Vec<StubSubstitution>,
}

impl TestManifest {
    /// True when the test reproduces structure only (stubs were needed).
    pub fn is_structural(&self) -> bool {
        !self.stubs.is_empty()
    }
}

/// Paths of the artifacts written for one generated test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifacts {
    pub source_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// A self-contained generated test unit.
#[derive(Debug, Clone)]
pub struct GeneratedTest {
    pub name: String,
    pub statements: Vec<Statement>,
    pub source: String,
    pub expected: ExpectedOutcome,
    pub manifest: TestManifest,
}

impl GeneratedTest {
    /// Write `<name>.rs` and `<name>.manifest.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> io::Result<GeneratedArtifacts> {
        std::fs::create_dir_all(dir)?;
        let source_path = dir.join(format!("{}.rs", self.name));
        std::fs::write(&source_path, &self.source)?;

        let manifest_path = dir.join(format!("{}.manifest.json", self.name));
        let manifest_json = serde_json::to_vec_pretty(&self.manifest).map_err(io::Error::other)?;
        std::fs::write(&manifest_path, manifest_json)?;

        Ok(GeneratedArtifacts {
            source_path,
            manifest_path,
        })
    }
}

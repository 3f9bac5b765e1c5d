//! Verification outcomes.

use serde::{Deserialize, Serialize};

/// Terminal result of one verification run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum VerificationVerdict {
    /// The generated test reproduced the recorded outcome exactly.
    Reproduced,

    /// The test reproduced the failure structurally, but stub substitutions
    /// (or skipped equality checks) stand in for unrepresentable values.
    PartiallyReproduced { reason: String },

    /// The test ran but its outcome diverged from the recording, or the run
    /// timed out.
    NotReproduced { reason: String },

    /// The generated unit did not compile.
    CompilationFailed { diagnostics: Vec<String> },
}

impl VerificationVerdict {
    /// True for `Reproduced` and `PartiallyReproduced`.
    pub fn reproduced(&self) -> bool {
        matches!(
            self,
            Self::Reproduced | Self::PartiallyReproduced { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Reproduced => "reproduced",
            Self::PartiallyReproduced { .. } => "partially reproduced",
            Self::NotReproduced { .. } => "not reproduced",
            Self::CompilationFailed { .. } => "compilation failed",
        }
    }
}

impl std::fmt::Display for VerificationVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reproduced => write!(f, "reproduced"),
            Self::PartiallyReproduced { reason } => {
                write!(f, "partially reproduced ({reason})")
            }
            Self::NotReproduced { reason } => write!(f, "not reproduced ({reason})"),
            Self::CompilationFailed { diagnostics } => {
                write!(f, "compilation failed ({} diagnostics)", diagnostics.len())
            }
        }
    }
}

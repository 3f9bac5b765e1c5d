//! Test synthesis: reproduction slice → compilable test source.

pub mod generator;
pub mod statement;

pub use generator::{GenerateError, TestGenerator};
pub use statement::{
    ExpectedOutcome, GeneratedArtifacts, GeneratedTest, Statement, StubSubstitution, TestManifest,
};

//! Verification: execute the generated test in isolation and compare the
//! outcome against the recording.

pub mod harness;
pub mod mock;
pub mod runner;
pub mod verdict;

pub use harness::{CargoHarness, ExecutionReport, HarnessConfig, HarnessError, TestHarness};
pub use mock::MockHarness;
pub use runner::VerificationRunner;
pub use verdict::VerificationVerdict;

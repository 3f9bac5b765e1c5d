pub mod analyzer;
pub mod bundle;
pub mod capture;
pub mod codegen;
pub mod config;
pub mod core;
pub mod trace;
pub mod util;
pub mod verify;

pub use analyzer::{AnalyzeError, Analyzer, ReproductionSlice};
pub use bundle::{ReproBundle, ReproBundleMeta};
pub use capture::{
    CaptureConfig, CaptureError, CaptureSession, EventFeed, EventTape, FeedError, JsonlEventFeed,
    RawEvent, TapeFeed,
};
pub use codegen::{GenerateError, GeneratedTest, TestGenerator, TestManifest};
pub use config::Settings;
pub use crate::core::{PipelineConfig, SessionOrchestrator, SessionResult, Stage, TerminalState};
pub use trace::{InvocationId, InvocationRecord, Trace, TraceSummary, ValueSnapshot};
pub use verify::{CargoHarness, HarnessConfig, MockHarness, VerificationVerdict};

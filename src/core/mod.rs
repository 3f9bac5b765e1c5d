//! Session orchestration.

pub mod pipeline;

pub use pipeline::{
    PipelineConfig, SessionOrchestrator, SessionResult, Stage, TerminalState,
};

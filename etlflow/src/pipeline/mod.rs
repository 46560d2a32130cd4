//! Pipeline definition and execution.
//!
//! This module provides:
//! - Pipeline specifications mirroring the YAML file
//! - The retry wrapper for extract and load
//! - The run state machine
//! - The engine and its run reports

mod engine;
mod lifecycle;
mod report;
mod retry;
mod spec;


pub use engine::{PipelineEngine, RunOptions, FAILURE_TARGET};
pub use lifecycle::{RunLifecycle, RunState};
pub use report::{RunOutcome, RunReport};
pub use retry::{with_retry, RetryExhausted, RetryPolicy};
pub use spec::{
    level_directive, ExtractSpec, FailurePolicy, IncrementalSpec, LoadSpec, PipelineFile,
    PipelineSpec, RunSettings, StageConfigSource, TransformSpec,
};

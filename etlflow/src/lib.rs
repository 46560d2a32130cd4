//! # Etlflow
//!
//! A configuration-driven extract/transform/load pipeline engine.
//!
//! A pipeline is declared in YAML: one extractor, an ordered list of
//! transformers, one loader, and optional incremental settings. Etlflow
//! provides:
//!
//! - **Component registry**: extractors, transformers and loaders looked up
//!   by string key and built fresh from their config on every run
//! - **Retry with backoff**: extract and load attempts retried with
//!   exponential backoff, each attempt wrapped in `connect`/`disconnect`
//! - **Incremental cursors**: the last loaded cursor is persisted atomically
//!   and injected into the next run's extractor config
//! - **Failure policies**: abort, skip or warn when a run fails
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etlflow::prelude::*;
//!
//! let registry = Arc::new(ComponentRegistry::with_builtins()?);
//! let engine = PipelineEngine::new(registry);
//! let report = engine
//!     .run_file(Path::new("pipelines/users.yaml"), RunOptions::new())
//!     .await?;
//! println!("loaded {} rows", report.rows_loaded);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod components;
pub mod config;
pub mod connectors;
pub mod dataset;
pub mod errors;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::components::{ComponentConfig, Extractor, Loader, Transformer, WriteMode};
    pub use crate::config::{load_pipeline, parse_pipeline_str};
    pub use crate::dataset::{Column, DataType, Dataset, Value};
    pub use crate::errors::{ErrorKind, EtlflowError, Result};
    pub use crate::pipeline::{
        FailurePolicy, IncrementalSpec, PipelineEngine, PipelineFile, PipelineSpec, RetryPolicy,
        RunOptions, RunOutcome, RunReport, RunSettings, RunState,
    };
    pub use crate::registry::{Category, ComponentRegistry, ComponentType};
    pub use crate::state::{CursorStore, CursorValue};
}

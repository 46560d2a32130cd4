//! Testing utilities for etlflow pipelines.
//!
//! This module provides:
//! - Scripted mock extractors, loaders and transformers
//! - Dataset and pipeline fixtures
//! - Assertions for datasets and run reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_column_type, assert_column_values, assert_columns, assert_run_succeeded,
    assert_run_tolerated,
};
pub use fixtures::{dataset, sample_users, TestPipeline};
pub use mocks::{FailingTransformer, MockExtractor, MockLoader};

//! Identity transformer.

use crate::components::Transformer;
use crate::dataset::Dataset;
use crate::errors::Result;

/// Returns its input unchanged. Useful as a placeholder step.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTransformer;

impl PassThroughTransformer {
    /// Registry key.
    pub const KEY: &'static str = "pass_through";

    /// Creates the transformer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Transformer for PassThroughTransformer {
    fn name(&self) -> &str {
        "PassThroughTransformer"
    }

    fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        tracing::debug!(rows = dataset.row_count(), "Passing dataset through");
        Ok(dataset)
    }
}

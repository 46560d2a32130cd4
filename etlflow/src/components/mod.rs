//! Component contracts: extractors, transformers and loaders.
//!
//! The engine only ever talks to these traits. Concrete connectors live in
//! [`crate::connectors`] and reach the engine through the
//! [`ComponentRegistry`](crate::registry::ComponentRegistry).

mod config;

pub use config::ComponentConfig;

use crate::dataset::Dataset;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Pulls data from an external source.
///
/// Lifecycle per attempt: [`connect`](Extractor::connect), then
/// [`extract`](Extractor::extract), then [`disconnect`](Extractor::disconnect),
/// which the engine calls even when the first two fail.
#[async_trait]
pub trait Extractor: Send + Sync + Debug {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens connections or authenticates.
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fetches the data.
    async fn extract(&mut self) -> Result<Dataset>;

    /// Releases resources.
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A pure dataset-to-dataset function.
///
/// Transformers run in declaration order. The engine calls
/// [`validate`](Transformer::validate) before
/// [`transform`](Transformer::transform) and never retries either.
pub trait Transformer: Send + Sync + Debug {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Checks input pre-conditions.
    fn validate(&self, _dataset: &Dataset) -> Result<()> {
        Ok(())
    }

    /// Produces the transformed dataset.
    fn transform(&self, dataset: Dataset) -> Result<Dataset>;
}

/// Writes a dataset to a destination.
///
/// Loads run under retry, so an implementation must tolerate being called
/// again after a transient failure.
#[async_trait]
pub trait Loader: Send + Sync + Debug {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens connections or prepares the destination.
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Persists the dataset.
    async fn load(&mut self, dataset: &Dataset) -> Result<()>;

    /// Releases resources.
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// How a loader treats data already at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Add rows after the existing ones.
    #[default]
    Append,
    /// Overwrite the destination.
    Replace,
    /// Refuse to write if the destination already exists.
    Fail,
    /// Insert new keys, overwrite rows whose key exists.
    Upsert,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Replace => write!(f, "replace"),
            Self::Fail => write!(f, "fail"),
            Self::Upsert => write!(f, "upsert"),
        }
    }
}

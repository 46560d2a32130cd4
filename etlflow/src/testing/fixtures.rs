//! Test fixtures for pipeline testing.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::pipeline::{
    ExtractSpec, LoadSpec, PipelineFile, PipelineSpec, RetryPolicy, RunSettings,
};
use crate::registry::{Category, ComponentRegistry};
use crate::testing::{MockExtractor, MockLoader};

/// Builds a dataset from JSON records, panicking on malformed input.
#[must_use]
#[allow(clippy::expect_used)]
pub fn dataset(records: serde_json::Value) -> Dataset {
    Dataset::from_json(&records).expect("fixture records must form a dataset")
}

/// Three user records with messy string values.
#[must_use]
pub fn sample_users() -> Vec<serde_json::Value> {
    vec![
        json!({"id": 1, "name": " Alice ", "email": "alice@example.com", "age": 30}),
        json!({"id": 2, "name": "Bob", "email": "bob@example.com", "age": null}),
        json!({"id": 3, "name": " Carol", "email": "not-an-email", "age": 41}),
    ]
}

/// A registry, mock handles and a pipeline wired to them.
///
/// The pipeline extracts from the `mock` extractor, has no transforms and
/// loads into the `mock` loader. Retries use a zero backoff so tests do not
/// sleep.
#[derive(Debug)]
pub struct TestPipeline {
    /// Registry with the built-ins plus both mocks under `mock`.
    pub registry: Arc<ComponentRegistry>,
    /// The extractor handle.
    pub extractor: MockExtractor,
    /// The loader handle.
    pub loader: MockLoader,
    /// The pipeline file.
    pub file: PipelineFile,
}

impl TestPipeline {
    /// Wires `extractor` and `loader` into a fresh registry.
    ///
    /// `state_dir` receives the cursor state file.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(name: &str, extractor: MockExtractor, loader: MockLoader, state_dir: &Path) -> Self {
        let mut registry =
            ComponentRegistry::with_builtins().expect("built-in registrations are unique");
        registry
            .register(
                Category::Extractor,
                "mock",
                MockExtractor::component_type(extractor.clone()),
            )
            .expect("mock extractor key is free");
        registry
            .register(Category::Loader, "mock", MockLoader::component_type(loader.clone()))
            .expect("mock loader key is free");

        let file = PipelineFile::new(PipelineSpec::new(
            name,
            ExtractSpec::new("mock"),
            LoadSpec::new("mock"),
        ))
        .with_settings(
            RunSettings::default()
                .with_retry(RetryPolicy::new(3, 0.0))
                .with_state_file(state_dir.join("state.json")),
        );

        Self {
            registry: Arc::new(registry),
            extractor,
            loader,
            file,
        }
    }

    /// Mutates the pipeline file in place.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut PipelineFile)) -> Self {
        f(&mut self.file);
        self
    }
}

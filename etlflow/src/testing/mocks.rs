//! Scripted components for testing pipelines.
//!
//! Each mock is a cheap handle over shared state. Register a handle with
//! [`MockExtractor::component_type`] (or the loader equivalent), run the
//! engine, then inspect the same handle to see what the engine did.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::components::{ComponentConfig, Extractor, Loader, Transformer};
use crate::dataset::{Dataset, Value};
use crate::errors::{EtlflowError, Result};
use crate::registry::ComponentType;

#[derive(Debug, Default)]
struct ExtractorScript {
    records: Vec<serde_json::Value>,
    failures_remaining: u32,
    cursor_filter: Option<(String, String)>,
    configs: Vec<ComponentConfig>,
    connect_calls: usize,
    extract_calls: usize,
    disconnect_calls: usize,
}

/// An extractor returning scripted records.
///
/// Can fail a fixed number of times before succeeding, and can emulate a
/// source that filters on an injected cursor parameter.
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    script: Arc<Mutex<ExtractorScript>>,
    config: ComponentConfig,
}

impl MockExtractor {
    /// Creates an extractor returning an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the records returned by `extract`.
    #[must_use]
    pub fn with_records(self, records: Vec<serde_json::Value>) -> Self {
        self.set_records(records);
        self
    }

    /// Makes the next `n` extract calls fail.
    #[must_use]
    pub fn failing_times(self, n: u32) -> Self {
        self.script.lock().failures_remaining = n;
        self
    }

    /// Keeps only records whose `field` is greater than the config value
    /// at `param` (a dotted path). Without that config value every record
    /// is returned.
    #[must_use]
    pub fn with_cursor_filter(self, field: impl Into<String>, param: impl Into<String>) -> Self {
        self.script.lock().cursor_filter = Some((field.into(), param.into()));
        self
    }

    /// Replaces the scripted records.
    pub fn set_records(&self, records: Vec<serde_json::Value>) {
        self.script.lock().records = records;
    }

    /// Wraps this handle as a registrable component type. Every instance
    /// the engine builds shares this handle's script.
    #[must_use]
    pub fn component_type(handle: Self) -> ComponentType {
        ComponentType::extractor("MockExtractor", move |config| {
            handle.script.lock().configs.push(config.clone());
            Ok(Box::new(Self {
                script: handle.script.clone(),
                config,
            }) as Box<dyn Extractor>)
        })
    }

    /// Configs the engine built instances with, oldest first.
    #[must_use]
    pub fn configs(&self) -> Vec<ComponentConfig> {
        self.script.lock().configs.clone()
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.script.lock().connect_calls
    }

    /// Number of `extract` calls.
    #[must_use]
    pub fn extract_calls(&self) -> usize {
        self.script.lock().extract_calls
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.script.lock().disconnect_calls
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "MockExtractor"
    }

    async fn connect(&mut self) -> Result<()> {
        self.script.lock().connect_calls += 1;
        Ok(())
    }

    async fn extract(&mut self) -> Result<Dataset> {
        let mut script = self.script.lock();
        script.extract_calls += 1;

        if script.failures_remaining > 0 {
            script.failures_remaining -= 1;
            return Err(EtlflowError::Dataset(format!(
                "scripted extract failure #{}",
                script.extract_calls
            )));
        }

        let records: Vec<serde_json::Value> = match &script.cursor_filter {
            Some((field, param)) => match self.config.get_path(param) {
                Some(cursor) => {
                    let cursor = Value::from_json(cursor);
                    script
                        .records
                        .iter()
                        .filter(|r| {
                            r.get(field).is_some_and(|v| {
                                Value::from_json(v).compare(&cursor)
                                    == Some(std::cmp::Ordering::Greater)
                            })
                        })
                        .cloned()
                        .collect()
                }
                None => script.records.clone(),
            },
            None => script.records.clone(),
        };

        Dataset::from_records(&records)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.script.lock().disconnect_calls += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LoaderScript {
    failures_remaining: u32,
    loads: Vec<Dataset>,
    configs: Vec<ComponentConfig>,
    connect_calls: usize,
    load_calls: usize,
    disconnect_calls: usize,
}

/// A loader that records every dataset it is given.
#[derive(Debug, Clone, Default)]
pub struct MockLoader {
    script: Arc<Mutex<LoaderScript>>,
}

impl MockLoader {
    /// Creates a loader that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` load calls fail.
    #[must_use]
    pub fn failing_times(self, n: u32) -> Self {
        self.set_failures(n);
        self
    }

    /// Makes the next `n` load calls fail, on a handle already in use.
    pub fn set_failures(&self, n: u32) {
        self.script.lock().failures_remaining = n;
    }

    /// Wraps this handle as a registrable component type.
    #[must_use]
    pub fn component_type(handle: Self) -> ComponentType {
        ComponentType::loader("MockLoader", move |config| {
            handle.script.lock().configs.push(config);
            Ok(Box::new(handle.clone()) as Box<dyn Loader>)
        })
    }

    /// Datasets successfully loaded, oldest first.
    #[must_use]
    pub fn loads(&self) -> Vec<Dataset> {
        self.script.lock().loads.clone()
    }

    /// The most recently loaded dataset.
    #[must_use]
    pub fn last_load(&self) -> Option<Dataset> {
        self.script.lock().loads.last().cloned()
    }

    /// Configs the engine built instances with.
    #[must_use]
    pub fn configs(&self) -> Vec<ComponentConfig> {
        self.script.lock().configs.clone()
    }

    /// Number of `load` calls, including failed ones.
    #[must_use]
    pub fn load_calls(&self) -> usize {
        self.script.lock().load_calls
    }

    /// Number of `connect` calls.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.script.lock().connect_calls
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.script.lock().disconnect_calls
    }
}

#[async_trait]
impl Loader for MockLoader {
    fn name(&self) -> &str {
        "MockLoader"
    }

    async fn connect(&mut self) -> Result<()> {
        self.script.lock().connect_calls += 1;
        Ok(())
    }

    async fn load(&mut self, dataset: &Dataset) -> Result<()> {
        let mut script = self.script.lock();
        script.load_calls += 1;

        if script.failures_remaining > 0 {
            script.failures_remaining -= 1;
            return Err(EtlflowError::Dataset(format!(
                "scripted load failure #{}",
                script.load_calls
            )));
        }

        script.loads.push(dataset.clone());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.script.lock().disconnect_calls += 1;
        Ok(())
    }
}

/// A transformer that always fails, in `validate` or in `transform`.
#[derive(Debug, Clone)]
pub struct FailingTransformer {
    message: String,
    in_validate: bool,
}

impl FailingTransformer {
    /// Fails in `transform`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            in_validate: false,
        }
    }

    /// Fails in `validate`, so `transform` is never reached.
    #[must_use]
    pub fn in_validate(mut self) -> Self {
        self.in_validate = true;
        self
    }

    /// Wraps this transformer as a registrable component type.
    #[must_use]
    pub fn component_type(self) -> ComponentType {
        ComponentType::transformer("FailingTransformer", move |_config| {
            Ok(Box::new(self.clone()) as Box<dyn Transformer>)
        })
    }
}

impl Transformer for FailingTransformer {
    fn name(&self) -> &str {
        "FailingTransformer"
    }

    fn validate(&self, _dataset: &Dataset) -> Result<()> {
        if self.in_validate {
            return Err(EtlflowError::transform(self.name(), &self.message));
        }
        Ok(())
    }

    fn transform(&self, _dataset: Dataset) -> Result<Dataset> {
        Err(EtlflowError::transform(self.name(), &self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_extractor_fails_then_succeeds() {
        let handle = MockExtractor::new()
            .with_records(vec![json!({"id": 1})])
            .failing_times(1);
        let mut ext = handle
            .clone()
            .component_type_instance(ComponentConfig::new());

        assert!(ext.extract().await.is_err());
        let ds = ext.extract().await.unwrap();
        assert_eq!(ds.row_count(), 1);
        assert_eq!(handle.extract_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_extractor_cursor_filter() {
        let handle = MockExtractor::new()
            .with_records(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 5})])
            .with_cursor_filter("id", "since_id");
        let mut ext = handle
            .clone()
            .component_type_instance(ComponentConfig::new().with("since_id", json!(1)));

        let ds = ext.extract().await.unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(handle.configs().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_loader_records_loads() {
        let handle = MockLoader::new().failing_times(1);
        let mut loader = MockLoader::component_type(handle.clone())
            .build_loader(ComponentConfig::new())
            .unwrap();
        let ds = Dataset::from_records(&[json!({"id": 1})]).unwrap();

        assert!(loader.load(&ds).await.is_err());
        loader.load(&ds).await.unwrap();
        assert_eq!(handle.load_calls(), 2);
        assert_eq!(handle.loads().len(), 1);

        handle.set_failures(1);
        assert!(loader.load(&ds).await.is_err());
        assert_eq!(handle.loads().len(), 1);
    }

    #[test]
    fn test_failing_transformer() {
        let t = FailingTransformer::new("nope");
        let ds = Dataset::empty();
        assert!(t.validate(&ds).is_ok());
        assert!(t.transform(ds.clone()).is_err());
        assert!(t.in_validate().validate(&ds).is_err());
    }

    impl MockExtractor {
        fn component_type_instance(self, config: ComponentConfig) -> Box<dyn Extractor> {
            Self::component_type(self).build_extractor(config).unwrap()
        }
    }
}

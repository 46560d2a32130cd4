//! Local JSON file extractor.

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::path::PathBuf;

use crate::components::{ComponentConfig, Extractor};
use crate::dataset::{Dataset, Value};
use crate::errors::{EtlflowError, Result};

/// Layout of the JSON document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orient {
    /// An array of objects, one per row.
    #[default]
    Records,
    /// An object mapping column name to an array of cells.
    Columns,
}

fn default_filter_param() -> String {
    "since".to_string()
}

/// Config for [`JsonFileExtractor`].
///
/// Unknown keys are tolerated so the engine can inject a cursor.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonFileConfig {
    /// File to read.
    pub file_path: PathBuf,
    /// Document layout.
    #[serde(default)]
    pub orient: Orient,
    /// Keep only rows whose value in this column exceeds the cursor.
    #[serde(default)]
    pub filter_field: Option<String>,
    /// Config key path holding the cursor; match it to the pipeline's
    /// `cursor_param`.
    #[serde(default = "default_filter_param")]
    pub filter_param: String,
}

/// Reads a JSON file into a dataset, optionally keeping only rows newer
/// than an injected cursor.
#[derive(Debug, Clone)]
pub struct JsonFileExtractor {
    config: JsonFileConfig,
    cursor: Option<Value>,
}

impl JsonFileExtractor {
    /// Registry key.
    pub const KEY: &'static str = "json_file";

    /// Builds the extractor from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] if `file_path` is missing
    /// or a field has the wrong type.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: JsonFileConfig = config.parse(Self::KEY)?;
        let cursor = config
            .get_path(&parsed.filter_param)
            .filter(|v| !v.is_null())
            .map(Value::from_json);
        Ok(Self {
            config: parsed,
            cursor,
        })
    }

    fn apply_filter(&self, dataset: Dataset) -> Result<Dataset> {
        let (Some(field), Some(cursor)) = (&self.config.filter_field, &self.cursor) else {
            return Ok(dataset);
        };
        if dataset.is_empty() {
            return Ok(dataset);
        }

        let column = dataset.column(field).ok_or_else(|| {
            EtlflowError::Dataset(format!(
                "filter_field '{field}' not found in {}",
                self.config.file_path.display()
            ))
        })?;
        let keep: Vec<bool> = column
            .values()
            .iter()
            .map(|v| v.compare(cursor) == Some(Ordering::Greater))
            .collect();

        let filtered = dataset.filter_rows(|i| keep[i]);
        tracing::info!(
            field = %field,
            cursor = %cursor,
            rows_in = dataset.row_count(),
            rows = filtered.row_count(),
            "Applied cursor filter"
        );
        Ok(filtered)
    }
}

#[async_trait]
impl Extractor for JsonFileExtractor {
    fn name(&self) -> &str {
        "JsonFileExtractor"
    }

    async fn extract(&mut self) -> Result<Dataset> {
        let path = &self.config.file_path;
        tracing::info!(path = %path.display(), orient = ?self.config.orient, "Reading JSON");

        let raw = tokio::fs::read_to_string(path).await?;
        let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            EtlflowError::Dataset(format!("invalid JSON in {}: {e}", path.display()))
        })?;

        let dataset = match (self.config.orient, &doc) {
            (Orient::Records, serde_json::Value::Array(records)) => Dataset::from_records(records)?,
            (Orient::Columns, serde_json::Value::Object(_)) => Dataset::from_json(&doc)?,
            (orient, _) => {
                return Err(EtlflowError::Dataset(format!(
                    "{} does not match orient {orient:?}",
                    path.display()
                )))
            }
        };

        tracing::info!(
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Loaded JSON file"
        );
        self.apply_filter(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, doc: &serde_json::Value) -> PathBuf {
        let path = dir.path().join("input.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        path
    }

    fn config(path: &std::path::Path) -> ComponentConfig {
        ComponentConfig::new().with("file_path", json!(path))
    }

    #[tokio::test]
    async fn test_reads_records() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]));

        let mut ext = JsonFileExtractor::from_config(&config(&path)).unwrap();
        let ds = ext.extract().await.unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column_names(), vec!["id", "v"]);
    }

    #[tokio::test]
    async fn test_reads_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &json!({"id": [1, 2, 3], "v": ["a", "b", "c"]}));

        let cfg = config(&path).with("orient", json!("columns"));
        let ds = JsonFileExtractor::from_config(&cfg)
            .unwrap()
            .extract()
            .await
            .unwrap();
        assert_eq!(ds.row_count(), 3);
    }

    #[tokio::test]
    async fn test_orient_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &json!({"id": [1]}));

        let err = JsonFileExtractor::from_config(&config(&path))
            .unwrap()
            .extract()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dataset);
    }

    #[tokio::test]
    async fn test_cursor_filter() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &json!([{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}]));

        let cfg = config(&path)
            .with("filter_field", json!("id"))
            .with("since_id", json!(2))
            .with("filter_param", json!("since_id"));
        let ds = JsonFileExtractor::from_config(&cfg)
            .unwrap()
            .extract()
            .await
            .unwrap();
        assert_eq!(ds.row_count(), 2);
    }

    #[tokio::test]
    async fn test_no_cursor_means_no_filter() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &json!([{"id": 1}, {"id": 2}]));

        let cfg = config(&path).with("filter_field", json!("id"));
        let ds = JsonFileExtractor::from_config(&cfg)
            .unwrap()
            .extract()
            .await
            .unwrap();
        assert_eq!(ds.row_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let cfg = ComponentConfig::new().with("file_path", json!("/no/such/file.json"));
        let err = JsonFileExtractor::from_config(&cfg)
            .unwrap()
            .extract()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_missing_file_path_is_config_error() {
        let err = JsonFileExtractor::from_config(&ComponentConfig::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigValidation);
    }
}

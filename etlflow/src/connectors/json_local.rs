//! Local JSON file loader.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::json_file::Orient;
use crate::components::{ComponentConfig, Loader, WriteMode};
use crate::dataset::{Dataset, Value};
use crate::errors::{EtlflowError, Result};

const fn default_indent() -> usize {
    2
}

const fn default_if_exists() -> WriteMode {
    WriteMode::Replace
}

/// Config for [`JsonLocalLoader`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonLocalConfig {
    /// File to write.
    pub output_path: PathBuf,
    /// What to do when the file already exists.
    #[serde(default = "default_if_exists")]
    pub if_exists: WriteMode,
    /// Document layout.
    #[serde(default)]
    pub orient: Orient,
    /// Spaces per indent level; 0 writes compact JSON.
    #[serde(default = "default_indent")]
    pub indent: usize,
    /// Columns identifying a row for `upsert`.
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

/// Writes a dataset to a local JSON file.
///
/// Every write goes through a temp file in the target directory that is
/// renamed over the destination, so readers never see a partial document.
#[derive(Debug, Clone)]
pub struct JsonLocalLoader {
    config: JsonLocalConfig,
}

impl JsonLocalLoader {
    /// Registry key.
    pub const KEY: &'static str = "json_local";

    /// Builds the loader from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] if `output_path` is
    /// missing or `upsert` is requested without `primary_keys`.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: JsonLocalConfig = config.parse(Self::KEY)?;
        if parsed.if_exists == WriteMode::Upsert && parsed.primary_keys.is_empty() {
            return Err(EtlflowError::config_validation(
                Self::KEY,
                "primary_keys is required when if_exists is 'upsert'",
            ));
        }
        Ok(Self { config: parsed })
    }

    async fn read_existing(&self) -> Result<Option<Dataset>> {
        let path = &self.config.output_path;
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            EtlflowError::Dataset(format!("existing {} is not valid JSON: {e}", path.display()))
        })?;
        Dataset::from_json(&doc).map(Some)
    }

    fn render(&self, dataset: &Dataset) -> Result<Vec<u8>> {
        let doc = match self.config.orient {
            Orient::Records => serde_json::Value::Array(dataset.to_records()),
            Orient::Columns => serde_json::Value::Object(
                dataset
                    .columns()
                    .iter()
                    .map(|c| {
                        let cells = c.values().iter().map(Value::to_json).collect();
                        (c.name().to_string(), serde_json::Value::Array(cells))
                    })
                    .collect(),
            ),
        };

        let mut out = Vec::new();
        let written = if self.config.indent == 0 {
            serde_json::to_writer(&mut out, &doc)
        } else {
            let indent = vec![b' '; self.config.indent];
            let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
            let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
            doc.serialize(&mut ser)
        };
        written.map_err(|e| EtlflowError::Dataset(format!("cannot serialize dataset: {e}")))?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Merges `incoming` into `existing` by primary key.
///
/// Existing rows keep their position and take the incoming values when the
/// key matches; new keys are appended. The last incoming row wins when a key
/// repeats.
pub(crate) fn upsert_rows(
    existing: &Dataset,
    incoming: &Dataset,
    keys: &[String],
) -> Result<Dataset> {
    for part in [existing, incoming] {
        if let Some(missing) = keys.iter().find(|k| !part.has_column(k)) {
            if part.row_count() > 0 {
                return Err(EtlflowError::Dataset(format!(
                    "primary key column '{missing}' not found"
                )));
            }
        }
    }

    let row_key = |ds: &Dataset, row: usize| -> Vec<String> {
        keys.iter()
            .map(|k| {
                ds.column(k)
                    .and_then(|c| c.get(row))
                    .map_or_else(|| Value::Null.key(), Value::key)
            })
            .collect()
    };

    let offset = existing.row_count();
    let mut latest: HashMap<Vec<String>, usize> = HashMap::new();
    let mut new_keys = Vec::new();
    for row in 0..incoming.row_count() {
        let key = row_key(incoming, row);
        if latest.insert(key.clone(), offset + row).is_none() {
            new_keys.push(key);
        }
    }

    let mut indices = Vec::with_capacity(offset + incoming.row_count());
    let mut matched = std::collections::HashSet::new();
    for row in 0..offset {
        let key = row_key(existing, row);
        match latest.get(&key) {
            Some(&idx) => {
                indices.push(idx);
                matched.insert(key);
            }
            None => indices.push(row),
        }
    }
    indices.extend(
        new_keys
            .iter()
            .filter(|k| !matched.contains(*k))
            .filter_map(|k| latest.get(k).copied()),
    );

    Ok(existing.concat(incoming).take_rows(&indices))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl Loader for JsonLocalLoader {
    fn name(&self) -> &str {
        "JsonLocalLoader"
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(parent) = self.config.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    async fn load(&mut self, dataset: &Dataset) -> Result<()> {
        let path = self.config.output_path.clone();
        let mode = self.config.if_exists;

        let merged = match mode {
            WriteMode::Replace => None,
            WriteMode::Fail => {
                if tokio::fs::try_exists(&path).await? {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("{} already exists", path.display()),
                    )
                    .into());
                }
                None
            }
            WriteMode::Append => self.read_existing().await?.map(|old| old.concat(dataset)),
            WriteMode::Upsert => match self.read_existing().await? {
                Some(old) => Some(upsert_rows(&old, dataset, &self.config.primary_keys)?),
                None => None,
            },
        };
        let output = merged.as_ref().unwrap_or(dataset);

        let bytes = self.render(output)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &bytes))
            .await
            .map_err(std::io::Error::other)??;

        tracing::info!(
            path = %path.display(),
            mode = %mode,
            rows_written = dataset.row_count(),
            rows_total = output.row_count(),
            "Wrote JSON file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{assert_column_values, dataset};
    use serde_json::json;
    use tempfile::TempDir;

    fn loader(path: &Path, extra: serde_json::Value) -> JsonLocalLoader {
        let mut cfg = ComponentConfig::new().with("output_path", json!(path));
        cfg.merge(ComponentConfig::from_value("json_local", extra).unwrap());
        JsonLocalLoader::from_config(&cfg).unwrap()
    }

    async fn read(path: &Path) -> serde_json::Value {
        serde_json::from_str(&tokio::fs::read_to_string(path).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_replace_is_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut l = loader(&path, json!({}));

        l.load(&dataset(json!([{"id": 1}]))).await.unwrap();
        l.load(&dataset(json!([{"id": 2}]))).await.unwrap();
        assert_eq!(read(&path).await, json!([{"id": 2}]));
    }

    #[tokio::test]
    async fn test_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut l = loader(&path, json!({"if_exists": "append"}));

        l.load(&dataset(json!([{"id": 1}]))).await.unwrap();
        l.load(&dataset(json!([{"id": 2}, {"id": 3}]))).await.unwrap();
        assert_eq!(read(&path).await, json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    }

    #[tokio::test]
    async fn test_fail_when_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut l = loader(&path, json!({"if_exists": "fail"}));

        l.load(&dataset(json!([{"id": 1}]))).await.unwrap();
        let err = l.load(&dataset(json!([{"id": 2}]))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(read(&path).await, json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_matching_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut l = loader(&path, json!({"if_exists": "upsert", "primary_keys": ["id"]}));

        l.load(&dataset(json!([{"id": 1, "v": "x"}, {"id": 2, "v": "a"}]))).await.unwrap();
        l.load(&dataset(json!([{"id": 1, "v": "y"}, {"id": 3, "v": "b"}]))).await.unwrap();
        assert_eq!(
            read(&path).await,
            json!([{"id": 1, "v": "y"}, {"id": 2, "v": "a"}, {"id": 3, "v": "b"}])
        );
    }

    #[test]
    fn test_upsert_requires_primary_keys() {
        let cfg = ComponentConfig::new()
            .with("output_path", json!("out.json"))
            .with("if_exists", json!("upsert"));
        let err = JsonLocalLoader::from_config(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigValidation);
    }

    #[test]
    fn test_upsert_rows_last_incoming_wins() {
        let old = dataset(json!([{"id": 1, "v": "old"}]));
        let new = dataset(json!([{"id": 1, "v": "first"}, {"id": 1, "v": "second"}]));
        let merged = upsert_rows(&old, &new, &["id".to_string()]).unwrap();
        assert_column_values(&merged, "v", &[Value::Str("second".into())]);
    }

    #[tokio::test]
    async fn test_columns_orient_and_compact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let mut l = loader(&path, json!({"orient": "columns", "indent": 0}));

        l.connect().await.unwrap();
        l.load(&dataset(json!([{"id": 1}, {"id": 2}]))).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw, "{\"id\":[1,2]}\n");
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let mut l = loader(&path, json!({}));
        l.load(&dataset(json!([{"id": 1}]))).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

//! Durable cursor storage for incremental pipelines.
//!
//! A state file is a single JSON object mapping pipeline name to that
//! pipeline's last committed cursor. Several pipelines may share one file;
//! commits are read-merge-write under a per-path lock and land through an
//! atomic rename, so readers only ever see a complete file.

use crate::errors::{EtlflowError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tempfile::NamedTempFile;

/// An opaque scalar cursor value as stored on disk.
pub type CursorValue = serde_json::Value;

static PATH_LOCKS: LazyLock<DashMap<PathBuf, Arc<Mutex<()>>>> = LazyLock::new(DashMap::new);

fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    PATH_LOCKS.entry(key).or_default().clone()
}

/// File-backed pipeline cursor store.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// Creates a store over the given state file. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cursor stored for `pipeline`, if any.
    ///
    /// A missing file or entry yields `None`. An unreadable, corrupt or
    /// non-object file is logged at `warn` and also yields `None`.
    #[must_use]
    pub fn load(&self, pipeline: &str) -> Option<CursorValue> {
        match self.read_all() {
            Ok(mut entries) => entries.remove(pipeline),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable state file"
                );
                None
            }
        }
    }

    /// Reads every stored cursor.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::StateStore`] if the file exists but cannot
    /// be read or does not hold a JSON object.
    pub fn read_all(&self) -> Result<serde_json::Map<String, CursorValue>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(serde_json::Map::new());
            }
            Err(e) => return Err(self.error(e)),
        };

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(self.error(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(self.error(format!("corrupt state file: {e}"))),
        }
    }

    /// Stores `value` as the cursor of `pipeline`, keeping other entries.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::StateStore`] if the existing file is corrupt
    /// or the new file cannot be written. The previous file is left intact
    /// in both cases.
    pub fn commit(&self, pipeline: &str, value: CursorValue) -> Result<()> {
        let lock = lock_for(&self.path);
        let _guard = lock.lock();

        let mut entries = self.read_all()?;
        entries.insert(pipeline.to_string(), value);

        let body = serde_json::to_string_pretty(&serde_json::Value::Object(entries))
            .map_err(|e| self.error(e))?;

        self.write_atomically(|file| {
            file.write_all(body.as_bytes())?;
            file.write_all(b"\n")
        })?;

        tracing::debug!(path = %self.path.display(), pipeline, "Committed cursor");
        Ok(())
    }

    /// Writes through a temp file in the target directory, fsyncs it and
    /// renames it over the target. If `write` fails the temp file is
    /// removed and the target is untouched.
    fn write_atomically(
        &self,
        write: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
    ) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.error(e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.error(e))?;
        write(tmp.as_file_mut()).map_err(|e| self.error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.error(e))?;
        tmp.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }

    fn error(&self, message: impl ToString) -> EtlflowError {
        EtlflowError::state_store(self.path.display(), message.to_string())
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CursorStore {
        CursorStore::new(dir.path().join("state.json"))
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).load("orders"), None);
    }

    #[test]
    fn test_commit_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.commit("orders", json!(3)).unwrap();
        assert_eq!(store.load("orders"), Some(json!(3)));
        assert_eq!(store.load("other"), None);
    }

    #[test]
    fn test_commit_keeps_other_pipelines() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.commit("a", json!(1)).unwrap();
        store.commit("b", json!("2024-01-01")).unwrap();
        store.commit("a", json!(5)).unwrap();

        let all = store.read_all().unwrap();
        assert_eq!(all.get("a"), Some(&json!(5)));
        assert_eq!(all.get("b"), Some(&json!("2024-01-01")));
    }

    #[test]
    fn test_file_is_pretty_json_object() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.commit("orders", json!(3)).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"orders\": 3"));
    }

    #[test]
    fn test_commit_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join("nested/deeper/state.json"));
        store.commit("p", json!(1)).unwrap();
        assert_eq!(store.load("p"), Some(json!(1)));
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.load("orders"), None);
    }

    #[test]
    fn test_commit_refuses_to_clobber_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "[1, 2]").unwrap();

        let err = store.commit("orders", json!(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateStore);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_interrupted_write_keeps_old_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.commit("orders", json!(3)).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let result = store.write_atomically(|file| {
            file.write_all(b"{\"orders\": ")?;
            Err(std::io::Error::other("disk went away"))
        });

        assert_eq!(result.unwrap_err().kind(), ErrorKind::StateStore);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
        assert_eq!(store.load("orders"), Some(json!(3)));

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_concurrent_commits_all_land() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = CursorStore::new(path.clone());
                std::thread::spawn(move || store.commit(&format!("p{i}"), json!(i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = CursorStore::new(path).read_all().unwrap();
        assert_eq!(all.len(), 8);
    }
}

//! Per-component configuration maps.

use crate::errors::{EtlflowError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The merged config handed to a component factory.
///
/// A thin wrapper over a JSON object. Components usually deserialize it
/// into their own typed config with [`ComponentConfig::parse`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentConfig(serde_json::Map<String, serde_json::Value>);

impl ComponentConfig {
    /// Creates an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] unless `value` is an
    /// object or null.
    pub fn from_value(component: &str, value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            serde_json::Value::Null => Ok(Self::default()),
            other => Err(EtlflowError::config_validation(
                component,
                format!("expected a mapping, got {other}"),
            )),
        }
    }

    /// Sets a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Inserts a key, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value)
    }

    /// Shallow-merges `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Sets a value under a dotted path (`query_params.since_id`), creating
    /// intermediate objects as needed.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] if an intermediate key
    /// holds a non-object value.
    pub fn set_path(
        &mut self,
        component: &str,
        path: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let leaf = parts.pop().unwrap_or(path);
        let mut current = &mut self.0;

        for part in parts {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            current = entry.as_object_mut().ok_or_else(|| {
                EtlflowError::config_validation(
                    component,
                    format!("cannot inject '{path}': '{part}' is not a mapping"),
                )
            })?;
        }

        current.insert(leaf.to_string(), value);
        Ok(())
    }

    /// Reads a value under a dotted path.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&serde_json::Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.0.get(first)?, |v, part| v.get(part))
    }

    /// Returns a top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Returns true if the config has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    /// Deserializes the config into a typed struct.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] naming `component` if the
    /// config does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self, component: &str) -> Result<T> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone()))
            .map_err(|e| EtlflowError::config_validation(component, e.to_string()))
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ComponentConfig {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

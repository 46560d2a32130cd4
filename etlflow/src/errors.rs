//! Error types for the etlflow engine.
//!
//! Every failure a pipeline run can hit is classified into one of the
//! [`ErrorKind`]s below. The engine decides what to do with a failure
//! (abort, skip, warn) purely from that classification.

use crate::pipeline::RunState;
use crate::registry::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EtlflowError>;

/// The main error type for etlflow operations.
#[derive(Debug, Error)]
pub enum EtlflowError {
    /// No component is registered under the requested key.
    #[error("Unknown {category} '{key}'. Available: {}", display_available(available))]
    UnknownComponent {
        /// The registry category that was searched.
        category: Category,
        /// The key that failed to resolve.
        key: String,
        /// Keys registered in that category.
        available: Vec<String>,
    },

    /// A component was registered twice under the same key.
    #[error("Duplicate {category} registration: '{key}' is already registered to {existing}")]
    DuplicateKey {
        /// The registry category.
        category: Category,
        /// The duplicated key.
        key: String,
        /// Type name of the component already holding the key.
        existing: String,
    },

    /// A component config was malformed.
    #[error("Invalid config for {component}: {message}")]
    ConfigValidation {
        /// The component key or stage the config belongs to.
        component: String,
        /// What is wrong with it.
        message: String,
    },

    /// The pipeline file could not be read or parsed.
    #[error("Pipeline config error: {0}")]
    Config(String),

    /// Extraction failed.
    #[error("Extraction failed in {component} after {attempts} attempt(s): {message}")]
    Extraction {
        /// The extractor name.
        component: String,
        /// Number of attempts made.
        attempts: u32,
        /// The final error message.
        message: String,
    },

    /// A transformer rejected or failed on its input.
    #[error("Transform failed in {component}: {message}")]
    Transform {
        /// The transformer name.
        component: String,
        /// The error message.
        message: String,
    },

    /// Loading failed.
    #[error("Load failed in {component} after {attempts} attempt(s): {message}")]
    Load {
        /// The loader name.
        component: String,
        /// Number of attempts made.
        attempts: u32,
        /// The final error message.
        message: String,
    },

    /// The cursor state could not be read or persisted.
    #[error("State store error for {path}: {message}")]
    StateStore {
        /// The state file path.
        path: String,
        /// The error message.
        message: String,
    },

    /// A dataset invariant was violated.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// The run lifecycle was asked to make an illegal state transition.
    #[error("Illegal run state transition {from} -> {to}")]
    InvalidTransition {
        /// The current state.
        from: RunState,
        /// The requested state.
        to: RunState,
    },

    /// A SQL destination rejected a statement.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An HTTP source returned an error or an unreadable body.
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_available(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

/// Coarse classification of an [`EtlflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Registry resolution miss.
    UnknownComponent,
    /// Duplicate registry key.
    DuplicateKey,
    /// Malformed component config.
    ConfigValidation,
    /// Unreadable or invalid pipeline file.
    Config,
    /// Extractor failure.
    Extraction,
    /// Transformer failure.
    Transform,
    /// Loader failure.
    Load,
    /// Cursor persistence failure.
    StateStore,
    /// Dataset shape violation.
    Dataset,
    /// Lifecycle misuse.
    InvalidTransition,
    /// SQL failure.
    Database,
    /// HTTP failure.
    Http,
    /// Raw IO failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownComponent => "unknown_component",
            Self::DuplicateKey => "duplicate_key",
            Self::ConfigValidation => "config_validation",
            Self::Config => "config",
            Self::Extraction => "extraction",
            Self::Transform => "transform",
            Self::Load => "load",
            Self::StateStore => "state_store",
            Self::Dataset => "dataset",
            Self::InvalidTransition => "invalid_transition",
            Self::Database => "database",
            Self::Http => "http",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

impl EtlflowError {
    /// Creates a config validation error.
    #[must_use]
    pub fn config_validation(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Creates a transform error.
    #[must_use]
    pub fn transform(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Creates a state store error.
    #[must_use]
    pub fn state_store(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::StateStore {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownComponent { .. } => ErrorKind::UnknownComponent,
            Self::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            Self::ConfigValidation { .. } => ErrorKind::ConfigValidation,
            Self::Config(_) => ErrorKind::Config,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Transform { .. } => ErrorKind::Transform,
            Self::Load { .. } => ErrorKind::Load,
            Self::StateStore { .. } => ErrorKind::StateStore,
            Self::Dataset(_) => ErrorKind::Dataset,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Database(_) => ErrorKind::Database,
            Self::Http(_) => ErrorKind::Http,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns the attempt count for retried stage failures.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::Extraction { attempts, .. } | Self::Load { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind().to_string()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::UnknownComponent {
                category,
                key,
                available,
            } => {
                map.insert("category".to_string(), serde_json::json!(category.to_string()));
                map.insert("key".to_string(), serde_json::json!(key));
                map.insert("available".to_string(), serde_json::json!(available));
            }
            Self::DuplicateKey { category, key, .. } => {
                map.insert("category".to_string(), serde_json::json!(category.to_string()));
                map.insert("key".to_string(), serde_json::json!(key));
            }
            Self::ConfigValidation { component, .. } | Self::Transform { component, .. } => {
                map.insert("component".to_string(), serde_json::json!(component));
            }
            Self::Extraction {
                component,
                attempts,
                ..
            }
            | Self::Load {
                component,
                attempts,
                ..
            } => {
                map.insert("component".to_string(), serde_json::json!(component));
                map.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            Self::StateStore { path, .. } => {
                map.insert("path".to_string(), serde_json::json!(path));
            }
            Self::InvalidTransition { from, to } => {
                map.insert("from".to_string(), serde_json::json!(from.to_string()));
                map.insert("to".to_string(), serde_json::json!(to.to_string()));
            }
            Self::Config(_)
            | Self::Dataset(_)
            | Self::Database(_)
            | Self::Http(_)
            | Self::Io(_) => {}
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_component_lists_available() {
        let err = EtlflowError::UnknownComponent {
            category: Category::Extractor,
            key: "nope".to_string(),
            available: vec!["json_file".to_string(), "rest_api".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("Unknown extractor 'nope'"));
        assert!(msg.contains("json_file, rest_api"));
        assert_eq!(err.kind(), ErrorKind::UnknownComponent);
    }

    #[test]
    fn test_unknown_component_empty_registry() {
        let err = EtlflowError::UnknownComponent {
            category: Category::Loader,
            key: "x".to_string(),
            available: Vec::new(),
        };
        assert!(err.to_string().ends_with("(none)"));
    }

    #[test]
    fn test_attempts_only_on_retried_errors() {
        let err = EtlflowError::Load {
            component: "JsonLocalLoader".to_string(),
            attempts: 3,
            message: "disk full".to_string(),
        };
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(EtlflowError::transform("t", "bad").attempts(), None);
    }

    #[test]
    fn test_to_dict() {
        let err = EtlflowError::Extraction {
            component: "JsonFileExtractor".to_string(),
            attempts: 2,
            message: "missing file".to_string(),
        };
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "extraction");
        assert_eq!(dict.get("attempts").unwrap(), 2);
        assert_eq!(dict.get("component").unwrap(), "JsonFileExtractor");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EtlflowError = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}

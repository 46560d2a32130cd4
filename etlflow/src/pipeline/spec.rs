//! Declarative pipeline definitions.
//!
//! These types mirror the pipeline YAML file one to one. They are plain
//! data: parsing lives in [`crate::config`], execution in
//! [`PipelineEngine`](super::PipelineEngine).

use super::retry::RetryPolicy;
use crate::errors::{EtlflowError, Result};
use crate::state::CursorValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A whole pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    /// File format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// The pipeline definition.
    pub pipeline: PipelineSpec,
    /// Run-level settings.
    #[serde(default)]
    pub settings: RunSettings,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl PipelineFile {
    /// Creates a file with default settings.
    #[must_use]
    pub fn new(pipeline: PipelineSpec) -> Self {
        Self {
            version: default_version(),
            pipeline,
            settings: RunSettings::default(),
        }
    }

    /// Sets the run settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Checks every semantic constraint the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Config`] listing all violations.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        self.pipeline.collect_errors(&mut errors);

        if let Err(e) = self.settings.retry.validate() {
            errors.push(format!("settings.{e}"));
        }
        if self.settings.level_directive().is_none() {
            errors.push(format!(
                "settings.log_level: unknown level '{}'",
                self.settings.log_level
            ));
        }
        if self.settings.state_file.as_os_str().is_empty() {
            errors.push("settings.state_file must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EtlflowError::Config(errors.join("; ")))
        }
    }

    /// Makes stage `config_file` paths absolute against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let p = &mut self.pipeline;
        resolve(&mut p.extract.config_file, base_dir);
        for step in &mut p.transform {
            resolve(&mut step.config_file, base_dir);
        }
        resolve(&mut p.load.config_file, base_dir);
    }
}

fn resolve(path: &mut Option<PathBuf>, base_dir: &Path) {
    if let Some(p) = path.as_mut() {
        if p.is_relative() {
            *p = base_dir.join(&*p);
        }
    }
}

/// The `pipeline:` block of a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    /// Stable pipeline name; also the state-store key.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// The extract stage.
    pub extract: ExtractSpec,
    /// Transform steps in execution order.
    #[serde(default)]
    pub transform: Vec<TransformSpec>,
    /// The load stage.
    pub load: LoadSpec,
    /// Incremental extraction settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<IncrementalSpec>,
}

impl PipelineSpec {
    /// Creates a pipeline with no transforms and no incremental mode.
    #[must_use]
    pub fn new(name: impl Into<String>, extract: ExtractSpec, load: LoadSpec) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            extract,
            transform: Vec::new(),
            load,
            incremental: None,
        }
    }

    /// Appends a transform step.
    #[must_use]
    pub fn with_transform(mut self, step: TransformSpec) -> Self {
        self.transform.push(step);
        self
    }

    /// Enables incremental mode.
    #[must_use]
    pub fn with_incremental(mut self, incremental: IncrementalSpec) -> Self {
        self.incremental = Some(incremental);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn collect_errors(&self, errors: &mut Vec<String>) {
        if self.name.trim().is_empty() {
            errors.push("pipeline.name cannot be empty or whitespace-only".to_string());
        }

        if self.extract.source.trim().is_empty() {
            errors.push("pipeline.extract.source cannot be empty".to_string());
        }
        if self.extract.config_file.is_none() && self.extract.inline_config.is_none() {
            errors.push(
                "pipeline.extract must provide at least one of 'config_file' or 'inline_config'"
                    .to_string(),
            );
        }

        for (idx, step) in self.transform.iter().enumerate() {
            if step.name.trim().is_empty() {
                errors.push(format!("pipeline.transform[{idx}].name cannot be empty"));
            }
        }

        if self.load.destination.trim().is_empty() {
            errors.push("pipeline.load.destination cannot be empty".to_string());
        }
        if self.load.config_file.is_none() && self.load.inline_config.is_none() {
            errors.push(
                "pipeline.load must provide at least one of 'config_file' or 'inline_config'"
                    .to_string(),
            );
        }

        if let Some(inc) = &self.incremental {
            if inc.cursor_field.trim().is_empty() {
                errors.push("pipeline.incremental.cursor_field cannot be empty".to_string());
            }
            if inc.cursor_param.trim().is_empty()
                || inc.cursor_param.split('.').any(|part| part.trim().is_empty())
            {
                errors.push(format!(
                    "pipeline.incremental.cursor_param '{}' is not a valid key path",
                    inc.cursor_param
                ));
            }
        }
    }
}

/// Where a stage's component config comes from.
///
/// `config_file` is read first; `inline_config` keys are merged over it.
pub trait StageConfigSource {
    /// Registry key of the component.
    fn key(&self) -> &str;
    /// Optional YAML file with the component config.
    fn config_file(&self) -> Option<&Path>;
    /// Optional inline config.
    fn inline_config(&self) -> Option<&serde_json::Map<String, serde_json::Value>>;
}

macro_rules! stage_spec {
    ($(#[$meta:meta])* $name:ident, $key:ident, $key_doc:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            #[doc = $key_doc]
            pub $key: String,
            /// YAML file holding the component config.
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub config_file: Option<PathBuf>,
            /// Inline component config; wins over `config_file` keys.
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub inline_config: Option<serde_json::Map<String, serde_json::Value>>,
        }

        impl $name {
            /// Creates a stage with an empty inline config.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self {
                    $key: key.into(),
                    config_file: None,
                    inline_config: Some(serde_json::Map::new()),
                }
            }

            /// Sets the inline config from a JSON object. Non-object values
            /// leave the inline config unchanged.
            #[must_use]
            pub fn with_config(mut self, config: serde_json::Value) -> Self {
                if let serde_json::Value::Object(map) = config {
                    self.inline_config = Some(map);
                }
                self
            }

            /// Sets the config file.
            #[must_use]
            pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
                self.config_file = Some(path.into());
                self
            }
        }

        impl StageConfigSource for $name {
            fn key(&self) -> &str {
                &self.$key
            }

            fn config_file(&self) -> Option<&Path> {
                self.config_file.as_deref()
            }

            fn inline_config(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
                self.inline_config.as_ref()
            }
        }
    };
}

stage_spec!(
    /// The extract stage: an extractor key and its config.
    ExtractSpec,
    source,
    "Extractor registry key."
);

stage_spec!(
    /// One transform step: a transformer key and its config.
    TransformSpec,
    name,
    "Transformer registry key."
);

stage_spec!(
    /// The load stage: a loader key and its config.
    LoadSpec,
    destination,
    "Loader registry key."
);

/// Cursor-based incremental extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncrementalSpec {
    /// Column whose maximum becomes the next cursor.
    pub cursor_field: String,
    /// Key path injected into the extractor config, e.g. `since_id` or
    /// `query_params.since_id`.
    pub cursor_param: String,
    /// Cursor used when nothing is stored or on full refresh.
    #[serde(default)]
    pub initial_value: CursorValue,
}

impl IncrementalSpec {
    /// Creates an incremental spec with a null initial value.
    #[must_use]
    pub fn new(cursor_field: impl Into<String>, cursor_param: impl Into<String>) -> Self {
        Self {
            cursor_field: cursor_field.into(),
            cursor_param: cursor_param.into(),
            initial_value: CursorValue::Null,
        }
    }

    /// Sets the initial cursor.
    #[must_use]
    pub fn with_initial_value(mut self, value: CursorValue) -> Self {
        self.initial_value = value;
        self
    }
}

/// What the engine does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    Abort,
    /// Log at `info` and report zero rows processed.
    Skip,
    /// Log at `warn` and report zero rows processed.
    Warn,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

/// The `settings:` block of a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Log level name (`debug`, `INFO`, `warning`, ...).
    pub log_level: String,
    /// Retry policy for extract and load.
    pub retry: RetryPolicy,
    /// Failure policy.
    pub on_failure: FailurePolicy,
    /// Cursor state file, relative to the working directory.
    pub state_file: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            retry: RetryPolicy::default(),
            on_failure: FailurePolicy::Abort,
            state_file: PathBuf::from("state.json"),
        }
    }
}

impl RunSettings {
    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Sets the state file.
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Maps `log_level` onto a `tracing` filter directive.
    #[must_use]
    pub fn level_directive(&self) -> Option<&'static str> {
        level_directive(&self.log_level)
    }
}

/// Maps a log level name (case-insensitive) onto a `tracing` level.
#[must_use]
pub fn level_directive(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

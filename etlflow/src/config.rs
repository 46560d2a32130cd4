//! Pipeline YAML loading with environment variable substitution.

use crate::components::ComponentConfig;
use crate::errors::{EtlflowError, Result};
use crate::pipeline::{PipelineFile, StageConfigSource};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitutes `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns [`EtlflowError::Config`] naming every referenced variable that
/// is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();

    let result = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == &caps[1]) {
                missing.push(caps[1].to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(EtlflowError::Config(format!(
            "Missing environment variable(s): {}",
            missing.join(", ")
        )));
    }

    Ok(result.into_owned())
}

/// Parses and validates a pipeline YAML string.
///
/// # Errors
///
/// Returns [`EtlflowError::Config`] if substitution fails, the YAML does
/// not match the schema or a semantic check fails.
pub fn parse_pipeline_str(yaml: &str) -> Result<PipelineFile> {
    let substituted = substitute_env_vars(yaml)?;
    let file: PipelineFile = serde_yaml::from_str(&substituted)
        .map_err(|e| EtlflowError::Config(format!("Failed to parse pipeline YAML: {e}")))?;
    file.validate()?;
    Ok(file)
}

/// Reads, parses and validates a pipeline file.
///
/// Relative `config_file` paths are resolved against the file's directory.
///
/// # Errors
///
/// Returns [`EtlflowError::Config`] if the file cannot be read or is
/// invalid.
pub fn load_pipeline(path: &Path) -> Result<PipelineFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EtlflowError::Config(format!("Failed to read pipeline file {}: {e}", path.display()))
    })?;
    let mut file = parse_pipeline_str(&content)?;
    if let Some(dir) = path.parent() {
        file.resolve_paths(dir);
    }
    tracing::debug!(path = %path.display(), pipeline = %file.pipeline.name, "Loaded pipeline file");
    Ok(file)
}

/// Builds a stage's component config: `config_file` contents first, then
/// `inline_config` keys on top.
///
/// # Errors
///
/// Returns [`EtlflowError::ConfigValidation`] naming the component if the
/// config file is unreadable or not a YAML mapping.
pub fn compose_stage_config(stage: &impl StageConfigSource) -> Result<ComponentConfig> {
    let mut config = ComponentConfig::new();

    if let Some(path) = stage.config_file() {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EtlflowError::config_validation(
                stage.key(),
                format!("cannot read config_file {}: {e}", path.display()),
            )
        })?;
        let substituted = substitute_env_vars(&raw)
            .map_err(|e| EtlflowError::config_validation(stage.key(), e.to_string()))?;
        let value: serde_json::Value = serde_yaml::from_str(&substituted).map_err(|e| {
            EtlflowError::config_validation(
                stage.key(),
                format!("invalid YAML in {}: {e}", path.display()),
            )
        })?;
        config.merge(ComponentConfig::from_value(stage.key(), value)?);
    }

    if let Some(inline) = stage.inline_config() {
        config.merge(ComponentConfig::from(inline.clone()));
    }

    Ok(config)
}

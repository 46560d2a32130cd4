//! Row-level schema validation.
//!
//! Each row is checked against per-column rules. Invalid rows are logged and
//! dropped; the run continues with the rows that passed.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::components::{ComponentConfig, Transformer};
use crate::dataset::{cast_value, Column, DataType, Dataset, Value};
use crate::errors::{EtlflowError, Result};

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

const fn default_chunk_size() -> usize {
    1000
}

/// Checks for a single column.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldRule {
    /// Expected type name, as accepted by [`DataType::parse`].
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    /// Reject null or missing cells.
    pub required: bool,
    /// Inclusive numeric lower bound.
    pub min: Option<f64>,
    /// Inclusive numeric upper bound.
    pub max: Option<f64>,
    /// Minimum string length in characters.
    pub min_length: Option<usize>,
    /// Maximum string length in characters.
    pub max_length: Option<usize>,
    /// Regex the string must match.
    pub pattern: Option<String>,
    /// The string must look like an email address.
    pub email: bool,
    /// Allowed values.
    pub one_of: Option<Vec<serde_json::Value>>,
}

/// Config for [`RowValidationTransformer`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowValidationConfig {
    /// Column name to its rule.
    pub rules: BTreeMap<String, FieldRule>,
    /// Disable type coercion: `"5"` is not a valid `int`.
    #[serde(default)]
    pub strict: bool,
    /// Rows validated per progress log line.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug)]
struct CompiledRule {
    column: String,
    rule: FieldRule,
    dtype: Option<DataType>,
    pattern: Option<Regex>,
    one_of: Option<Vec<Value>>,
}

impl CompiledRule {
    fn compile(column: &str, rule: FieldRule) -> Result<Self> {
        let dtype = match &rule.type_name {
            Some(name) => Some(DataType::parse(name).ok_or_else(|| {
                EtlflowError::config_validation(
                    RowValidationTransformer::KEY,
                    format!("unknown type '{name}' for column '{column}'"),
                )
            })?),
            None => None,
        };
        let pattern = rule
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| {
                EtlflowError::config_validation(
                    RowValidationTransformer::KEY,
                    format!("invalid pattern for column '{column}': {e}"),
                )
            })?;
        let one_of = rule
            .one_of
            .as_ref()
            .map(|values| values.iter().map(Value::from_json).collect());
        Ok(Self {
            column: column.to_string(),
            rule,
            dtype,
            pattern,
            one_of,
        })
    }

    /// Returns the reason `cell` fails this rule.
    fn check(&self, cell: Option<&Value>, strict: bool) -> Option<String> {
        // NaN counts as missing, like null.
        let Some(cell) = cell.filter(|v| !v.is_null()) else {
            return self.rule.required.then(|| "field required".to_string());
        };

        let value = match self.dtype {
            Some(dtype) if cell.data_type() != Some(dtype) => {
                if strict {
                    return Some(format!("expected {dtype}, got {cell}"));
                }
                match cast_value(cell, dtype) {
                    Ok(v) => v,
                    Err(reason) => return Some(reason),
                }
            }
            _ => cell.clone(),
        };

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.rule.min.filter(|min| n < *min) {
                return Some(format!("{n} is less than {min}"));
            }
            if let Some(max) = self.rule.max.filter(|max| n > *max) {
                return Some(format!("{n} is greater than {max}"));
            }
        }

        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if let Some(min) = self.rule.min_length.filter(|min| len < *min) {
                return Some(format!("length {len} is shorter than {min}"));
            }
            if let Some(max) = self.rule.max_length.filter(|max| len > *max) {
                return Some(format!("length {len} is longer than {max}"));
            }
            if let Some(re) = self.pattern.as_ref().filter(|re| !re.is_match(s)) {
                return Some(format!("'{s}' does not match {}", re.as_str()));
            }
            if self.rule.email && !EMAIL_RE.is_match(s) {
                return Some(format!("'{s}' is not a valid email address"));
            }
        }

        if let Some(allowed) = &self.one_of {
            if !allowed.iter().any(|a| a.key() == value.key()) {
                return Some(format!("{value} is not one of the allowed values"));
            }
        }
        None
    }
}

/// Drops rows that fail their column rules.
#[derive(Debug)]
pub struct RowValidationTransformer {
    rules: Vec<CompiledRule>,
    strict: bool,
    chunk_size: usize,
}

impl RowValidationTransformer {
    /// Registry key.
    pub const KEY: &'static str = "row_validation";

    /// Builds the transformer from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] for a missing `rules` map,
    /// unknown type names or invalid patterns.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: RowValidationConfig = config.parse(Self::KEY)?;
        if parsed.chunk_size == 0 {
            return Err(EtlflowError::config_validation(
                Self::KEY,
                "chunk_size must be greater than 0",
            ));
        }
        let rules = parsed
            .rules
            .into_iter()
            .map(|(column, rule)| CompiledRule::compile(&column, rule))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            strict: parsed.strict,
            chunk_size: parsed.chunk_size,
        })
    }

    fn row_errors(&self, dataset: &Dataset, row: usize) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|r| {
                let cell = dataset.column(&r.column).and_then(|c| c.get(row));
                r.check(cell, self.strict)
                    .map(|reason| format!("{}: {reason}", r.column))
            })
            .collect()
    }

    /// Rewrites typed columns so kept rows carry their coerced values.
    fn coerce(&self, mut dataset: Dataset) -> Result<Dataset> {
        for rule in &self.rules {
            let (Some(dtype), Some(col)) = (rule.dtype, dataset.column(&rule.column)) else {
                continue;
            };
            if col.dtype() == dtype || col.dtype() == DataType::Null {
                continue;
            }
            let values = col
                .values()
                .iter()
                .map(|v| cast_value(v, dtype))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EtlflowError::transform(self.name(), e))?;
            dataset.replace_column(Column::new(rule.column.clone(), dtype, values)?)?;
        }
        Ok(dataset)
    }
}

impl Transformer for RowValidationTransformer {
    fn name(&self) -> &str {
        "RowValidationTransformer"
    }

    fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        let total = dataset.row_count();
        let mut keep = vec![true; total];
        let mut invalid = 0usize;

        for (chunk_no, start) in (0..total).step_by(self.chunk_size).enumerate() {
            let end = (start + self.chunk_size).min(total);
            for row in start..end {
                let errors = self.row_errors(&dataset, row);
                if !errors.is_empty() {
                    tracing::warn!(row, errors = %errors.join("; "), "Row failed validation");
                    keep[row] = false;
                    invalid += 1;
                }
            }
            tracing::debug!(chunk = chunk_no, rows = end - start, "Validated chunk");
        }

        let valid = dataset.filter_rows(|i| keep[i]);
        tracing::info!(valid = valid.row_count(), invalid, total, "Validation complete");

        if valid.is_empty() {
            return Ok(dataset.empty_like());
        }
        if self.strict {
            Ok(valid)
        } else {
            self.coerce(valid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_column_type, assert_column_values, assert_columns, dataset, sample_users,
    };
    use serde_json::json;

    fn validator(config: serde_json::Value) -> RowValidationTransformer {
        let cfg = ComponentConfig::from_value("row_validation", config).unwrap();
        RowValidationTransformer::from_config(&cfg).unwrap()
    }

    #[test]
    fn test_sample_users_drops_bad_email() {
        let t = validator(json!({"rules": {
            "id": {"type": "int", "required": true},
            "email": {"email": true},
        }}));
        let out = t.transform(dataset(serde_json::Value::Array(sample_users()))).unwrap();
        assert_column_values(&out, "id", &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_invalid_rows_dropped() {
        let ds = dataset(json!([
            {"id": 1, "email": "a@example.com", "age": 30},
            {"id": 2, "email": "not-an-email", "age": 40},
            {"id": 3, "email": "c@example.com", "age": -1},
            {"id": null, "email": "d@example.com", "age": 20},
        ]));
        let t = validator(json!({"rules": {
            "id": {"required": true},
            "email": {"email": true},
            "age": {"type": "int", "min": 0, "max": 150},
        }}));
        let out = t.transform(ds).unwrap();
        assert_column_values(&out, "id", &[Value::Int(1)]);
    }

    #[test]
    fn test_required_rejects_nan() {
        let ds = Dataset::new(vec![
            Column::new("id", DataType::Int64, vec![Value::Int(1), Value::Int(2)]).unwrap(),
            Column::new(
                "score",
                DataType::Float64,
                vec![Value::Float(0.5), Value::Float(f64::NAN)],
            )
            .unwrap(),
        ])
        .unwrap();
        let out = validator(json!({"rules": {"score": {"required": true}}}))
            .transform(ds)
            .unwrap();
        assert_column_values(&out, "id", &[Value::Int(1)]);
    }

    #[test]
    fn test_all_invalid_keeps_columns() {
        let ds = dataset(json!([{"id": 1, "name": "x"}]));
        let t = validator(json!({"rules": {"name": {"min_length": 5}}}));
        let out = t.transform(ds).unwrap();
        assert_eq!(out.row_count(), 0);
        assert_columns(&out, &["id", "name"]);
    }

    #[test]
    fn test_lenient_mode_coerces() {
        let ds = dataset(json!({"n": ["1", "2", "x"]}));
        let out = validator(json!({"rules": {"n": {"type": "int"}}}))
            .transform(ds)
            .unwrap();
        assert_column_type(&out, "n", DataType::Int64);
        assert_column_values(&out, "n", &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_strict_mode_rejects_strings_for_int() {
        let ds = dataset(json!({"n": ["1", "2"]}));
        let out = validator(json!({"rules": {"n": {"type": "int"}}, "strict": true}))
            .transform(ds)
            .unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn test_pattern_and_one_of() {
        let ds = dataset(json!([
            {"code": "AB-1", "status": "active"},
            {"code": "zz", "status": "active"},
            {"code": "CD-2", "status": "deleted"},
        ]));
        let t = validator(json!({"rules": {
            "code": {"pattern": "^[A-Z]{2}-\\d$"},
            "status": {"one_of": ["active", "inactive"]},
        }}));
        let out = t.transform(ds).unwrap();
        assert_column_values(&out, "code", &[Value::Str("AB-1".into())]);
    }

    #[test]
    fn test_required_missing_column() {
        let ds = dataset(json!([{"id": 1}]));
        let out = validator(json!({"rules": {"name": {"required": true}}}))
            .transform(ds)
            .unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn test_bad_config_rejected() {
        for cfg in [
            json!({}),
            json!({"rules": {"a": {"type": "decimal"}}}),
            json!({"rules": {"a": {"pattern": "("}}}),
            json!({"rules": {}, "chunk_size": 0}),
        ] {
            let cfg = ComponentConfig::from_value("row_validation", cfg).unwrap();
            assert!(RowValidationTransformer::from_config(&cfg).is_err());
        }
    }
}

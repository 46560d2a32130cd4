//! Rule-based data cleaning.
//!
//! Rules always run in the order of [`CleaningRule::ORDER`], whatever order
//! their keys appear in the config. Rules that name a missing column log a
//! warning and skip that column.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::components::{ComponentConfig, Transformer};
use crate::dataset::{cast_value, parse_date, Column, DataType, Dataset, Value};
use crate::errors::{EtlflowError, Result};

/// `true` for every column, `false` for none, or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ColumnSelection {
    /// All columns when true.
    All(bool),
    /// Only these columns.
    Columns(Vec<String>),
}

impl Default for ColumnSelection {
    fn default() -> Self {
        Self::All(false)
    }
}

impl ColumnSelection {
    const fn is_enabled(&self) -> bool {
        match self {
            Self::All(enabled) => *enabled,
            Self::Columns(_) => true,
        }
    }
}

/// How to standardize date columns: a list uses the canonical date format,
/// a map gives each column its own output format.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DateFormats {
    /// Columns rendered as `%Y-%m-%d`.
    Columns(Vec<String>),
    /// Column to `strftime` format.
    Formats(BTreeMap<String, String>),
}

impl Default for DateFormats {
    fn default() -> Self {
        Self::Columns(Vec::new())
    }
}

/// Config for [`DataCleaningTransformer`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleaningConfig {
    /// Columns to remove.
    pub drop_columns: Vec<String>,
    /// Old name to new name, applied simultaneously.
    pub rename_columns: BTreeMap<String, String>,
    /// Lowercase every column name.
    pub lowercase_columns: bool,
    /// Trim string cells.
    pub strip_whitespace: ColumnSelection,
    /// Lowercase the string cells of these columns.
    pub lowercase_values: Vec<String>,
    /// Column to replacement value for null cells.
    pub fill_nulls: BTreeMap<String, serde_json::Value>,
    /// Drop rows holding a null in any (or any listed) column.
    pub drop_nulls: ColumnSelection,
    /// Drop columns whose cells are all null.
    pub drop_empty_columns: bool,
    /// Drop repeated rows, comparing all (or the listed) columns.
    pub deduplicate: ColumnSelection,
    /// Date columns to re-render.
    pub standardize_dates: DateFormats,
    /// Column to target type name (`int`, `float`, `str`, `bool`, `date`,
    /// `datetime`, `json`).
    pub cast_types: BTreeMap<String, String>,
}

/// One cleaning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CleaningRule {
    /// `drop_columns`
    DropColumns,
    /// `rename_columns`
    RenameColumns,
    /// `lowercase_columns`
    LowercaseColumns,
    /// `strip_whitespace` and `lowercase_values`
    NormalizeStrings,
    /// `fill_nulls`
    FillNulls,
    /// `drop_nulls`
    DropNulls,
    /// `drop_empty_columns`
    DropEmptyColumns,
    /// `deduplicate`
    Deduplicate,
    /// `standardize_dates`
    StandardizeDates,
    /// `cast_types`
    CastTypes,
}

impl CleaningRule {
    /// Execution order.
    pub const ORDER: [Self; 10] = [
        Self::DropColumns,
        Self::RenameColumns,
        Self::LowercaseColumns,
        Self::NormalizeStrings,
        Self::FillNulls,
        Self::DropNulls,
        Self::DropEmptyColumns,
        Self::Deduplicate,
        Self::StandardizeDates,
        Self::CastTypes,
    ];

    /// Config key that enables the rule.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::DropColumns => "drop_columns",
            Self::RenameColumns => "rename_columns",
            Self::LowercaseColumns => "lowercase_columns",
            Self::NormalizeStrings => "strip_whitespace",
            Self::FillNulls => "fill_nulls",
            Self::DropNulls => "drop_nulls",
            Self::DropEmptyColumns => "drop_empty_columns",
            Self::Deduplicate => "deduplicate",
            Self::StandardizeDates => "standardize_dates",
            Self::CastTypes => "cast_types",
        }
    }
}

/// Applies the configured [`CleaningRule`]s in their fixed order.
#[derive(Debug, Clone)]
pub struct DataCleaningTransformer {
    config: CleaningConfig,
}

impl DataCleaningTransformer {
    /// Registry key.
    pub const KEY: &'static str = "data_cleaning";

    /// Creates the transformer.
    #[must_use]
    pub const fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    /// Builds the transformer from its component config.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::ConfigValidation`] for unknown keys, wrong
    /// value shapes or unknown type names in `cast_types`.
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let parsed: CleaningConfig = config.parse(Self::KEY)?;
        if let Some((col, ty)) = parsed
            .cast_types
            .iter()
            .find(|(_, ty)| DataType::parse(ty).is_none())
        {
            return Err(EtlflowError::config_validation(
                Self::KEY,
                format!("cast_types: unknown type '{ty}' for column '{col}'"),
            ));
        }
        Ok(Self::new(parsed))
    }

    /// The rules this config enables, in execution order.
    #[must_use]
    pub fn plan(&self) -> Vec<CleaningRule> {
        let c = &self.config;
        CleaningRule::ORDER
            .into_iter()
            .filter(|rule| match rule {
                CleaningRule::DropColumns => !c.drop_columns.is_empty(),
                CleaningRule::RenameColumns => !c.rename_columns.is_empty(),
                CleaningRule::LowercaseColumns => c.lowercase_columns,
                CleaningRule::NormalizeStrings => {
                    c.strip_whitespace.is_enabled() || !c.lowercase_values.is_empty()
                }
                CleaningRule::FillNulls => !c.fill_nulls.is_empty(),
                CleaningRule::DropNulls => c.drop_nulls.is_enabled(),
                CleaningRule::DropEmptyColumns => c.drop_empty_columns,
                CleaningRule::Deduplicate => c.deduplicate.is_enabled(),
                CleaningRule::StandardizeDates => match &c.standardize_dates {
                    DateFormats::Columns(cols) => !cols.is_empty(),
                    DateFormats::Formats(map) => !map.is_empty(),
                },
                CleaningRule::CastTypes => !c.cast_types.is_empty(),
            })
            .collect()
    }

    fn apply(&self, rule: CleaningRule, ds: Dataset) -> Result<Dataset> {
        let c = &self.config;
        match rule {
            CleaningRule::DropColumns => Ok(drop_columns(ds, &c.drop_columns)),
            CleaningRule::RenameColumns => rename_columns(ds, &c.rename_columns),
            CleaningRule::LowercaseColumns => lowercase_columns(ds),
            CleaningRule::NormalizeStrings => {
                normalize_strings(ds, &c.strip_whitespace, &c.lowercase_values)
            }
            CleaningRule::FillNulls => fill_nulls(ds, &c.fill_nulls),
            CleaningRule::DropNulls => Ok(drop_nulls(ds, &c.drop_nulls)),
            CleaningRule::DropEmptyColumns => Ok(drop_empty_columns(ds)),
            CleaningRule::Deduplicate => Ok(deduplicate(ds, &c.deduplicate)),
            CleaningRule::StandardizeDates => standardize_dates(ds, &c.standardize_dates),
            CleaningRule::CastTypes => cast_types(ds, &c.cast_types),
        }
    }
}

impl Transformer for DataCleaningTransformer {
    fn name(&self) -> &str {
        "DataCleaningTransformer"
    }

    fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        let rows_before = dataset.row_count();
        let mut ds = dataset;
        for rule in self.plan() {
            ds = self
                .apply(rule, ds)
                .map_err(|e| EtlflowError::transform(self.name(), format!("{}: {e}", rule.key())))?;
        }
        tracing::info!(
            rows_in = rows_before,
            rows = ds.row_count(),
            removed = rows_before.saturating_sub(ds.row_count()),
            "Cleaning complete"
        );
        Ok(ds)
    }
}

fn warn_missing(rule: &str, ds: &Dataset, columns: impl IntoIterator<Item = impl AsRef<str>>) {
    let missing: Vec<String> = columns
        .into_iter()
        .filter(|c| !ds.has_column(c.as_ref()))
        .map(|c| c.as_ref().to_string())
        .collect();
    if !missing.is_empty() {
        tracing::warn!(rule, ?missing, "Columns not found, skipping");
    }
}

fn drop_columns(mut ds: Dataset, columns: &[String]) -> Dataset {
    warn_missing("drop_columns", &ds, columns);
    let rows = ds.row_count();
    for col in columns {
        ds.drop_column(col);
    }
    if ds.column_count() == 0 && rows > 0 {
        tracing::warn!(rows, "drop_columns removed every column");
    }
    ds
}

fn rename_columns(ds: Dataset, mapping: &BTreeMap<String, String>) -> Result<Dataset> {
    warn_missing("rename_columns", &ds, mapping.keys());
    relabel(ds, |name| mapping.get(name).cloned())
}

fn lowercase_columns(ds: Dataset) -> Result<Dataset> {
    relabel(ds, |name| Some(name.to_lowercase()))
}

/// Renames every column at once; `f` returns the new name or `None` to keep.
fn relabel(ds: Dataset, f: impl Fn(&str) -> Option<String>) -> Result<Dataset> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(ds.column_count());
    for col in ds.columns() {
        let name = f(col.name()).unwrap_or_else(|| col.name().to_string());
        if !seen.insert(name.clone()) {
            return Err(EtlflowError::Dataset(format!(
                "renaming would produce duplicate column '{name}'"
            )));
        }
        columns.push(Column::new(name, col.dtype(), col.values().to_vec())?);
    }
    Dataset::new(columns)
}

fn normalize_strings(
    mut ds: Dataset,
    strip: &ColumnSelection,
    lowercase: &[String],
) -> Result<Dataset> {
    let strip_cols: Vec<String> = match strip {
        ColumnSelection::All(true) => ds.column_names().into_iter().map(String::from).collect(),
        ColumnSelection::All(false) => Vec::new(),
        ColumnSelection::Columns(cols) => {
            warn_missing("strip_whitespace", &ds, cols);
            cols.clone()
        }
    };
    warn_missing("lowercase_values", &ds, lowercase);

    let targets: Vec<String> = ds
        .column_names()
        .into_iter()
        .filter(|n| strip_cols.iter().any(|c| c == n) || lowercase.iter().any(|c| c == n))
        .map(String::from)
        .collect();

    for name in targets {
        let Some(col) = ds.column(&name) else { continue };
        let dtype = col.dtype();
        if !matches!(dtype, DataType::Utf8 | DataType::Json) {
            continue;
        }
        let do_strip = strip_cols.contains(&name);
        let do_lower = lowercase.contains(&name);
        let normalize = |s: &str| {
            let s = if do_strip { s.trim() } else { s };
            if do_lower {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        };
        // Mixed columns keep their `Json` type; only the string cells change.
        let values = col
            .values()
            .iter()
            .map(|v| match v {
                Value::Str(s) => Value::Str(normalize(s)),
                Value::Json(serde_json::Value::String(s)) => {
                    Value::Json(serde_json::Value::String(normalize(s)))
                }
                other => other.clone(),
            })
            .collect();
        ds.replace_column(Column::new(name, dtype, values)?)?;
    }
    Ok(ds)
}

fn fill_nulls(mut ds: Dataset, fills: &BTreeMap<String, serde_json::Value>) -> Result<Dataset> {
    warn_missing("fill_nulls", &ds, fills.keys());
    for (name, fill) in fills {
        let Some(col) = ds.column(name) else { continue };
        let fill = Value::from_json(fill);
        let filled = col.map_infer(|v| if v.is_null() { fill.clone() } else { v.clone() });
        ds.replace_column(filled)?;
    }
    Ok(ds)
}

fn drop_nulls(ds: Dataset, selection: &ColumnSelection) -> Dataset {
    let columns: Vec<&Column> = match selection {
        ColumnSelection::All(false) => return ds,
        ColumnSelection::All(true) => ds.columns().iter().collect(),
        ColumnSelection::Columns(names) => {
            warn_missing("drop_nulls", &ds, names);
            names.iter().filter_map(|n| ds.column(n)).collect()
        }
    };
    if columns.is_empty() {
        return ds;
    }
    let keep: Vec<bool> = (0..ds.row_count())
        .map(|i| columns.iter().all(|c| c.get(i).is_some_and(|v| !v.is_null())))
        .collect();
    ds.filter_rows(|i| keep[i])
}

fn drop_empty_columns(mut ds: Dataset) -> Dataset {
    if ds.is_empty() {
        return ds;
    }
    let empty: Vec<String> = ds
        .columns()
        .iter()
        .filter(|c| c.is_all_null())
        .map(|c| c.name().to_string())
        .collect();
    if !empty.is_empty() {
        tracing::debug!(?empty, "Dropping all-null columns");
    }
    let rows = ds.row_count();
    for name in &empty {
        ds.drop_column(name);
    }
    if ds.column_count() == 0 {
        tracing::warn!(rows, "Every column was null; dataset is now empty");
    }
    ds
}

fn deduplicate(ds: Dataset, selection: &ColumnSelection) -> Dataset {
    let columns: Vec<&Column> = match selection {
        ColumnSelection::All(false) => return ds,
        ColumnSelection::All(true) => ds.columns().iter().collect(),
        ColumnSelection::Columns(names) => {
            warn_missing("deduplicate", &ds, names);
            names.iter().filter_map(|n| ds.column(n)).collect()
        }
    };
    if columns.is_empty() {
        return ds;
    }
    let mut seen = HashSet::new();
    let keep: Vec<bool> = (0..ds.row_count())
        .map(|i| {
            let key: Vec<String> = columns
                .iter()
                .map(|c| c.get(i).map_or_else(|| Value::Null.key(), Value::key))
                .collect();
            seen.insert(key)
        })
        .collect();
    ds.filter_rows(|i| keep[i])
}

fn standardize_dates(mut ds: Dataset, dates: &DateFormats) -> Result<Dataset> {
    let targets: Vec<(String, String)> = match dates {
        DateFormats::Columns(cols) => cols
            .iter()
            .map(|c| (c.clone(), crate::dataset::DATE_FORMAT.to_string()))
            .collect(),
        DateFormats::Formats(map) => map.iter().map(|(c, f)| (c.clone(), f.clone())).collect(),
    };
    warn_missing("standardize_dates", &ds, targets.iter().map(|(c, _)| c));

    for (name, format) in targets {
        let Some(col) = ds.column(&name) else { continue };
        let mut unparsable = 0usize;
        let values = col
            .values()
            .iter()
            .map(|v| {
                let date = match v {
                    Value::Null => return Value::Null,
                    Value::Date(d) => Some(*d),
                    Value::Timestamp(t) => Some(t.date()),
                    Value::Str(s) => parse_date(s),
                    _ => None,
                };
                date.map_or_else(
                    || {
                        unparsable += 1;
                        Value::Null
                    },
                    |d| Value::Str(d.format(&format).to_string()),
                )
            })
            .collect();
        if unparsable > 0 {
            tracing::warn!(column = %name, unparsable, "Unparsable dates set to null");
        }
        ds.replace_column(Column::infer(name, values))?;
    }
    Ok(ds)
}

fn cast_types(mut ds: Dataset, types: &BTreeMap<String, String>) -> Result<Dataset> {
    warn_missing("cast_types", &ds, types.keys());
    for (name, type_name) in types {
        let Some(col) = ds.column(name) else { continue };
        let Some(target) = DataType::parse(type_name) else {
            continue;
        };
        let cast: std::result::Result<Vec<Value>, String> =
            col.values().iter().map(|v| cast_value(v, target)).collect();
        match cast {
            Ok(values) => ds.replace_column(Column::new(name.clone(), target, values)?)?,
            Err(reason) => {
                tracing::warn!(
                    column = %name,
                    target = %target,
                    reason = %reason,
                    "Cast failed, column left unchanged"
                );
            }
        }
    }
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_column_type, assert_column_values, assert_columns, dataset};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cleaner(config: serde_json::Value) -> DataCleaningTransformer {
        let cfg = ComponentConfig::from_value("data_cleaning", config).unwrap();
        DataCleaningTransformer::from_config(&cfg).unwrap()
    }

    fn strs(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::Str((*s).to_string())).collect()
    }

    #[test]
    fn test_strip_and_lowercase_values() {
        let ds = dataset(json!({"id": [1, 2, 3], "val": ["a", " B ", "c"]}));
        let out = cleaner(json!({"strip_whitespace": true, "lowercase_values": ["val"]}))
            .transform(ds)
            .unwrap();
        assert_column_values(&out, "val", &strs(&["a", "b", "c"]));
    }

    #[test]
    fn test_strip_reaches_strings_in_mixed_column() {
        let ds = dataset(json!({"code": [" a ", 5, "a"]}));
        assert_column_type(&ds, "code", DataType::Json);

        let out = cleaner(json!({"strip_whitespace": true, "deduplicate": true}))
            .transform(ds)
            .unwrap();
        assert_column_type(&out, "code", DataType::Json);
        assert_column_values(
            &out,
            "code",
            &[Value::Json(json!("a")), Value::Json(json!(5))],
        );
    }

    #[test]
    fn test_order_is_fixed_regardless_of_key_order() {
        let input = dataset(json!([
            {"ID": 1, "Name": " x ", "Junk": 0},
            {"ID": 1, "Name": "x", "Junk": 1},
            {"ID": 2, "Name": null, "Junk": 2},
        ]));
        let forward = cleaner(json!({
            "drop_columns": ["Junk"],
            "lowercase_columns": true,
            "strip_whitespace": true,
            "fill_nulls": {"name": "unknown"},
            "deduplicate": true,
            "cast_types": {"id": "str"},
        }));
        let backward = cleaner(json!({
            "cast_types": {"id": "str"},
            "deduplicate": true,
            "fill_nulls": {"name": "unknown"},
            "strip_whitespace": true,
            "lowercase_columns": true,
            "drop_columns": ["Junk"],
        }));

        assert_eq!(forward.plan(), backward.plan());
        let a = forward.transform(input.clone()).unwrap();
        let b = backward.transform(input).unwrap();
        assert_eq!(a, b);

        assert_columns(&a, &["id", "name"]);
        assert_eq!(a.row_count(), 2);
        assert_column_values(&a, "name", &strs(&["x", "unknown"]));
        assert_column_type(&a, "id", DataType::Utf8);
    }

    #[test]
    fn test_plan_follows_rule_order() {
        let t = cleaner(json!({
            "cast_types": {"a": "int"},
            "drop_nulls": true,
            "rename_columns": {"a": "b"},
        }));
        assert_eq!(
            t.plan(),
            vec![CleaningRule::RenameColumns, CleaningRule::DropNulls, CleaningRule::CastTypes]
        );
    }

    #[test]
    fn test_missing_columns_are_skipped() {
        let ds = dataset(json!([{"a": 1}]));
        let out = cleaner(json!({
            "drop_columns": ["nope"],
            "rename_columns": {"nope": "x"},
            "fill_nulls": {"nope": 0},
            "cast_types": {"nope": "int"},
        }))
        .transform(ds.clone())
        .unwrap();
        assert_eq!(out, ds);
    }

    #[test]
    fn test_rename_collision_is_transform_error() {
        let ds = dataset(json!([{"a": 1, "b": 2}]));
        let err = cleaner(json!({"rename_columns": {"a": "b"}}))
            .transform(ds)
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Transform);
    }

    #[test]
    fn test_drop_nulls_subset() {
        let ds = dataset(json!([
            {"a": 1, "b": null},
            {"a": null, "b": 2},
            {"a": 3, "b": 3},
        ]));
        let out = cleaner(json!({"drop_nulls": ["a"]})).transform(ds.clone()).unwrap();
        assert_eq!(out.row_count(), 2);

        let out = cleaner(json!({"drop_nulls": true})).transform(ds).unwrap();
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_drop_empty_columns() {
        let ds = dataset(json!([{"a": 1, "b": null}, {"a": 2, "b": null}]));
        let out = cleaner(json!({"drop_empty_columns": true})).transform(ds).unwrap();
        assert_columns(&out, &["a"]);
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_deduplicate_subset_keeps_first() {
        let ds = dataset(json!([
            {"id": 1, "v": "first"},
            {"id": 1, "v": "second"},
            {"id": 2, "v": "third"},
        ]));
        let out = cleaner(json!({"deduplicate": ["id"]})).transform(ds).unwrap();
        assert_column_values(&out, "v", &strs(&["first", "third"]));
    }

    #[test]
    fn test_standardize_dates() {
        let ds = dataset(json!({"d": ["2024/01/05", "2024-02-10T08:00:00", "garbage", null]}));
        let out = cleaner(json!({"standardize_dates": {"d": "%d.%m.%Y"}}))
            .transform(ds)
            .unwrap();
        assert_column_values(
            &out,
            "d",
            &[
                Value::Str("05.01.2024".into()),
                Value::Str("10.02.2024".into()),
                Value::Null,
                Value::Null,
            ],
        );
    }

    #[test]
    fn test_cast_failure_leaves_column_unchanged() {
        let ds = dataset(json!({"n": ["1", "two"]}));
        let out = cleaner(json!({"cast_types": {"n": "int"}})).transform(ds).unwrap();
        assert_column_type(&out, "n", DataType::Utf8);
    }

    #[test]
    fn test_cast_success() {
        let ds = dataset(json!({"n": ["1", " 2 "]}));
        let out = cleaner(json!({"cast_types": {"n": "int"}})).transform(ds).unwrap();
        assert_column_values(&out, "n", &[Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_unknown_cast_type_rejected_at_construction() {
        let cfg = ComponentConfig::new().with("cast_types", json!({"n": "decimal"}));
        assert!(DataCleaningTransformer::from_config(&cfg).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let cfg = ComponentConfig::new().with("drop_colums", json!(["a"]));
        assert!(DataCleaningTransformer::from_config(&cfg).is_err());
    }
}

//! The tabular dataset passed between pipeline stages.
//!
//! A [`Dataset`] is an ordered list of named [`Column`]s of equal length.
//! Row order is significant. All constructors and mutators preserve the
//! equal-length invariant, so no transformer can hand a misaligned table to
//! the next stage.

mod cast;
mod column;
mod value;

pub use cast::{cast_value, parse_date, parse_timestamp};
pub use column::Column;
pub use value::{DataType, Value, DATE_FORMAT, TIMESTAMP_FORMAT};

use crate::errors::{EtlflowError, Result};
use std::collections::HashSet;

/// Columnar, row-ordered table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Creates a dataset from columns.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if column lengths differ or a
    /// column name repeats.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map_or(0, Column::len);
        let mut names = HashSet::new();

        for col in &columns {
            if col.len() != row_count {
                return Err(EtlflowError::Dataset(format!(
                    "column '{}' has {} rows, expected {row_count}",
                    col.name(),
                    col.len()
                )));
            }
            if !names.insert(col.name()) {
                return Err(EtlflowError::Dataset(format!(
                    "duplicate column name '{}'",
                    col.name()
                )));
            }
        }

        Ok(Self { columns, row_count })
    }

    /// Creates an empty dataset with no columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a zero-row dataset that keeps the column layout of `self`.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(&[])).collect(),
            row_count: 0,
        }
    }

    /// Builds a dataset from a list of JSON objects (records orientation).
    ///
    /// Column order follows first appearance of each key; keys missing from
    /// a record become nulls.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if any record is not an object.
    pub fn from_records(records: &[serde_json::Value]) -> Result<Self> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();

        for (idx, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or_else(|| {
                EtlflowError::Dataset(format!("record {idx} is not a JSON object"))
            })?;
            for key in obj.keys() {
                if seen.insert(key.clone()) {
                    names.push(key.clone());
                }
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(&name).map_or(Value::Null, Value::from_json))
                    .collect();
                Column::infer(name, values)
            })
            .collect();

        Self::new(columns)
    }

    /// Builds a dataset from JSON in either records orientation (array of
    /// objects) or columns orientation (object of arrays). A single object
    /// of scalars is treated as one record.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] for any other shape.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(records) => Self::from_records(records),
            serde_json::Value::Object(obj) if obj.values().all(serde_json::Value::is_array) => {
                let columns = obj
                    .iter()
                    .map(|(name, cells)| {
                        let values = cells
                            .as_array()
                            .map(|a| a.iter().map(Value::from_json).collect())
                            .unwrap_or_default();
                        Column::infer(name.clone(), values)
                    })
                    .collect();
                Self::new(columns)
            }
            serde_json::Value::Object(_) => Self::from_records(std::slice::from_ref(value)),
            other => Err(EtlflowError::Dataset(format!(
                "expected a JSON array or object, got {other}"
            ))),
        }
    }

    /// Converts the dataset to a list of JSON objects.
    #[must_use]
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        (0..self.row_count)
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .map(|c| {
                        (
                            c.name().to_string(),
                            c.get(row).map_or(serde_json::Value::Null, Value::to_json),
                        )
                    })
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    /// Returns the number of rows.
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the dataset has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Returns the columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Returns true if a column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Returns the cells of row `idx` in column order.
    #[must_use]
    pub fn row(&self, idx: usize) -> Option<Vec<&Value>> {
        if idx >= self.row_count {
            return None;
        }
        Some(self.columns.iter().filter_map(|c| c.get(idx)).collect())
    }

    /// Returns a JSON object for row `idx`.
    #[must_use]
    pub fn record(&self, idx: usize) -> Option<serde_json::Map<String, serde_json::Value>> {
        if idx >= self.row_count {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| {
                    (
                        c.name().to_string(),
                        c.get(idx).map_or(serde_json::Value::Null, Value::to_json),
                    )
                })
                .collect(),
        )
    }

    /// Returns a new dataset with the rows at `indices`, in that order.
    #[must_use]
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            row_count: indices.len(),
        }
    }

    /// Returns a new dataset keeping rows where `keep` is true.
    #[must_use]
    pub fn filter_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let indices: Vec<usize> = (0..self.row_count).filter(|&i| keep(i)).collect();
        self.take_rows(&indices)
    }

    /// Appends the rows of `other` below `self`, aligning columns by name.
    ///
    /// Columns present in only one side are filled with nulls; column types
    /// are re-inferred.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut names: Vec<&str> = self.column_names();
        for name in other.column_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let mut values = Vec::with_capacity(self.row_count + other.row_count);
                for part in [self, other] {
                    match part.column(name) {
                        Some(col) => values.extend(col.values().iter().cloned()),
                        None => values.extend(std::iter::repeat(Value::Null).take(part.row_count)),
                    }
                }
                Column::infer(name, values)
            })
            .collect();

        Self {
            columns,
            row_count: self.row_count + other.row_count,
        }
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] on a length mismatch or a
    /// duplicate name.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(column.name()) {
            return Err(EtlflowError::Dataset(format!(
                "duplicate column name '{}'",
                column.name()
            )));
        }
        if self.columns.is_empty() {
            self.row_count = column.len();
        } else if column.len() != self.row_count {
            return Err(EtlflowError::Dataset(format!(
                "column '{}' has {} rows, expected {}",
                column.name(),
                column.len(),
                self.row_count
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replaces the column named like `column`, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if no such column exists or the
    /// length differs.
    pub fn replace_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.row_count {
            return Err(EtlflowError::Dataset(format!(
                "column '{}' has {} rows, expected {}",
                column.name(),
                column.len(),
                self.row_count
            )));
        }
        let slot = self
            .columns
            .iter_mut()
            .find(|c| c.name() == column.name())
            .ok_or_else(|| EtlflowError::Dataset(format!("no column '{}'", column.name())))?;
        *slot = column;
        Ok(())
    }

    /// Removes a column, returning it.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name() == name)?;
        let removed = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.row_count = 0;
        }
        Some(removed)
    }

    /// Renames a column.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if `from` is missing or `to`
    /// already names another column.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return if self.has_column(from) {
                Ok(())
            } else {
                Err(EtlflowError::Dataset(format!("no column '{from}'")))
            };
        }
        if self.has_column(to) {
            return Err(EtlflowError::Dataset(format!(
                "cannot rename '{from}' to existing column '{to}'"
            )));
        }
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name() == from)
            .ok_or_else(|| EtlflowError::Dataset(format!("no column '{from}'")))?;
        col.set_name(to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Dataset {
        Dataset::from_records(&[
            serde_json::json!({"id": 1, "val": "a"}),
            serde_json::json!({"id": 2, "val": " B "}),
            serde_json::json!({"id": 3, "val": "c"}),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_records_shape() {
        let ds = sample();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column_names(), vec!["id", "val"]);
        assert_eq!(ds.column("id").unwrap().dtype(), DataType::Int64);
    }

    #[test]
    fn test_from_records_missing_keys_are_null() {
        let ds = Dataset::from_records(&[
            serde_json::json!({"a": 1}),
            serde_json::json!({"b": "x"}),
        ])
        .unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b"]);
        assert_eq!(ds.column("a").unwrap().get(1), Some(&Value::Null));
    }

    #[test]
    fn test_from_records_rejects_scalars() {
        assert!(Dataset::from_records(&[serde_json::json!(1)]).is_err());
    }

    #[test]
    fn test_from_json_columns_orientation() {
        let ds = Dataset::from_json(&serde_json::json!({"id": [1, 2], "v": ["x", "y"]})).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.record(1).unwrap()["v"], serde_json::json!("y"));
    }

    #[test]
    fn test_new_rejects_misaligned_columns() {
        let a = Column::infer("a", vec![Value::Int(1)]);
        let b = Column::infer("b", vec![Value::Int(1), Value::Int(2)]);
        assert!(Dataset::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let a = Column::infer("a", vec![Value::Int(1)]);
        assert!(Dataset::new(vec![a.clone(), a]).is_err());
    }

    #[test]
    fn test_to_records_preserves_column_order() {
        let records = sample().to_records();
        assert_eq!(records[1], serde_json::json!({"id": 2, "val": " B "}));
        let keys: Vec<_> = records[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["id", "val"]);
    }

    #[test]
    fn test_filter_rows_keeps_alignment() {
        let ds = sample().filter_rows(|i| i != 1);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("val").unwrap().len(), 2);
        assert_eq!(ds.column("id").unwrap().values(), &[Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_push_column_length_checked() {
        let mut ds = sample();
        assert!(ds.push_column(Column::infer("z", vec![Value::Int(1)])).is_err());
        assert!(ds
            .push_column(Column::infer("z", vec![Value::Int(1); 3]))
            .is_ok());
        assert_eq!(ds.column_count(), 3);
    }

    #[test]
    fn test_rename_column_conflict() {
        let mut ds = sample();
        assert!(ds.rename_column("id", "val").is_err());
        ds.rename_column("id", "ID").unwrap();
        assert!(ds.has_column("ID"));
    }

    #[test]
    fn test_concat_aligns_by_name() {
        let a = Dataset::from_records(&[serde_json::json!({"id": 1})]).unwrap();
        let b = Dataset::from_records(&[serde_json::json!({"id": 2, "x": "y"})]).unwrap();
        let c = a.concat(&b);
        assert_eq!(c.row_count(), 2);
        assert_eq!(c.column("x").unwrap().get(0), Some(&Value::Null));
    }

    #[test]
    fn test_empty_like_keeps_columns() {
        let empty = sample().empty_like();
        assert!(empty.is_empty());
        assert_eq!(empty.column_names(), vec!["id", "val"]);
    }
}

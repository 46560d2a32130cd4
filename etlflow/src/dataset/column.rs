//! Homogeneously typed columns.

use super::value::{DataType, Value};
use crate::errors::{EtlflowError, Result};

/// A named, homogeneously typed sequence of cells.
///
/// Every non-null cell has the column's [`DataType`]. A column whose cells
/// are all null has type [`DataType::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: DataType,
    values: Vec<Value>,
}

impl Column {
    /// Creates a column with an explicit type.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if any non-null cell has a
    /// different type.
    pub fn new(name: impl Into<String>, dtype: DataType, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        if let Some((idx, bad)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_null() && v.data_type() != Some(dtype))
        {
            return Err(EtlflowError::Dataset(format!(
                "column '{name}' is {dtype} but row {idx} holds {}",
                bad.data_type().map_or_else(|| "null".to_string(), |t| t.to_string())
            )));
        }
        Ok(Self {
            name,
            dtype,
            values,
        })
    }

    /// Creates a column, inferring its type from the cells.
    ///
    /// Integers mixed with floats widen to `float64`; any other mix of
    /// types falls back to `json`.
    #[must_use]
    pub fn infer(name: impl Into<String>, values: Vec<Value>) -> Self {
        let mut seen: Option<DataType> = None;
        let mut mixed_numeric = false;
        let mut mixed = false;

        for dtype in values.iter().filter(|v| !v.is_null()).filter_map(Value::data_type) {
            match seen {
                None => seen = Some(dtype),
                Some(current) if current == dtype => {}
                Some(DataType::Int64 | DataType::Float64)
                    if matches!(dtype, DataType::Int64 | DataType::Float64) =>
                {
                    mixed_numeric = true;
                }
                Some(_) => mixed = true,
            }
        }

        let name = name.into();
        if mixed {
            let values = values
                .into_iter()
                .map(|v| if v.is_null() { Value::Null } else { Value::Json(v.to_json()) })
                .collect();
            return Self {
                name,
                dtype: DataType::Json,
                values,
            };
        }
        if mixed_numeric {
            let values = values
                .into_iter()
                .map(|v| v.as_f64().map_or(Value::Null, Value::Float))
                .collect();
            return Self {
                name,
                dtype: DataType::Float64,
                values,
            };
        }

        Self {
            name,
            dtype: seen.unwrap_or(DataType::Null),
            values: values
                .into_iter()
                .map(|v| if v.is_null() { Value::Null } else { v })
                .collect(),
        }
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column type.
    #[must_use]
    pub const fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Returns the cells.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the column, returning its cells.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the column has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the cell at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Returns true if every cell is null (vacuously true when empty).
    #[must_use]
    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }

    /// Returns the number of null cells.
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Returns the maximum non-null cell.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Dataset`] if the column type has no order.
    pub fn max(&self) -> Result<Option<&Value>> {
        if self.dtype == DataType::Null {
            return Ok(None);
        }
        if !self.dtype.is_orderable() {
            return Err(EtlflowError::Dataset(format!(
                "column '{}' of type {} has no ordering",
                self.name, self.dtype
            )));
        }

        let mut best: Option<&Value> = None;
        for value in self.values.iter().filter(|v| !v.is_null()) {
            best = match best {
                Some(current) if value.compare(current) != Some(std::cmp::Ordering::Greater) => {
                    Some(current)
                }
                _ => Some(value),
            };
        }
        Ok(best)
    }

    /// Returns a new column keeping the cells at `indices`, in that order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        let values = indices
            .iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or_default())
            .collect();
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            values,
        }
    }

    /// Applies `f` to every cell and re-infers the column type.
    #[must_use]
    pub fn map_infer(&self, f: impl FnMut(&Value) -> Value) -> Self {
        Self::infer(self.name.clone(), self.values.iter().map(f).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_mixed_types() {
        let err = Column::new(
            "id",
            DataType::Int64,
            vec![Value::Int(1), Value::Str("2".into())],
        )
        .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_new_allows_nulls() {
        let col = Column::new("id", DataType::Int64, vec![Value::Int(1), Value::Null]).unwrap();
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn test_infer_widens_numeric() {
        let col = Column::infer("x", vec![Value::Int(1), Value::Float(2.5)]);
        assert_eq!(col.dtype(), DataType::Float64);
        assert_eq!(col.values(), &[Value::Float(1.0), Value::Float(2.5)]);
    }

    #[test]
    fn test_infer_mixed_falls_back_to_json() {
        let col = Column::infer("x", vec![Value::Int(1), Value::Str("a".into()), Value::Null]);
        assert_eq!(col.dtype(), DataType::Json);
        assert_eq!(col.get(2), Some(&Value::Null));
    }

    #[test]
    fn test_infer_all_null() {
        let col = Column::infer("x", vec![Value::Null, Value::Null]);
        assert_eq!(col.dtype(), DataType::Null);
        assert!(col.is_all_null());
    }

    #[test]
    fn test_max_skips_nulls() {
        let col = Column::infer(
            "id",
            vec![Value::Int(3), Value::Null, Value::Int(7), Value::Int(5)],
        );
        assert_eq!(col.max().unwrap(), Some(&Value::Int(7)));
    }

    #[test]
    fn test_max_of_strings() {
        let col = Column::infer(
            "ts",
            vec!["2024-01-02".into(), "2024-03-01".into(), "2023-12-31".into()],
        );
        assert_eq!(col.max().unwrap(), Some(&Value::Str("2024-03-01".into())));
    }

    #[test]
    fn test_max_json_is_error() {
        let col = Column::infer("x", vec![Value::Json(serde_json::json!([1]))]);
        assert!(col.max().is_err());
    }

    #[test]
    fn test_take_reorders() {
        let col = Column::infer("x", vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let taken = col.take(&[2, 0]);
        assert_eq!(taken.values(), &[Value::Int(3), Value::Int(1)]);
    }
}

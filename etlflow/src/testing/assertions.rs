//! Test assertions for datasets and run reports.

use crate::dataset::{DataType, Dataset, Value};
use crate::pipeline::{RunOutcome, RunReport};

/// Asserts that the run completed.
pub fn assert_run_succeeded(report: &RunReport) {
    assert_eq!(
        report.outcome,
        RunOutcome::Succeeded,
        "Expected success, got {:?} (error: {:?})",
        report.outcome,
        report.error
    );
}

/// Asserts that the run failed but was tolerated by the failure policy.
pub fn assert_run_tolerated(report: &RunReport) {
    assert!(
        matches!(report.outcome, RunOutcome::Skipped | RunOutcome::Warned),
        "Expected a tolerated failure, got {:?}",
        report.outcome
    );
    assert_eq!(report.rows_loaded, 0, "Tolerated failures load nothing");
}

/// Asserts that the dataset has the given column names, in order.
pub fn assert_columns(dataset: &Dataset, expected: &[&str]) {
    assert_eq!(
        dataset.column_names(),
        expected,
        "Unexpected column layout"
    );
}

/// Asserts that a column holds exactly `expected`.
pub fn assert_column_values(dataset: &Dataset, column: &str, expected: &[Value]) {
    let col = dataset.column(column).unwrap_or_else(|| {
        panic!(
            "Expected column '{column}', got {:?}",
            dataset.column_names()
        )
    });
    assert_eq!(col.values(), expected, "Unexpected values in column '{column}'");
}

/// Asserts the type of a column.
pub fn assert_column_type(dataset: &Dataset, column: &str, expected: DataType) {
    let actual = dataset.column(column).map(crate::dataset::Column::dtype);
    assert_eq!(
        actual,
        Some(expected),
        "Expected column '{column}' of type {expected}, got {actual:?}"
    );
}

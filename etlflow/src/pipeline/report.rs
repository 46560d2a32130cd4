//! Summary of a finished pipeline run.

use super::lifecycle::RunState;
use crate::errors::ErrorKind;
use crate::state::CursorValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// How a run ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed under `on_failure: skip`.
    Skipped,
    /// A stage failed under `on_failure: warn`.
    Warned,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Warned => write!(f, "warned"),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// The terminal lifecycle state.
    pub final_state: RunState,
    /// The state the run was in when it failed.
    pub failed_in: Option<RunState>,
    /// Rows returned by the extractor.
    pub rows_extracted: usize,
    /// Rows handed to the loader and accepted.
    pub rows_loaded: usize,
    /// Cursor the extractor was given.
    pub previous_cursor: Option<CursorValue>,
    /// Cursor committed by this run, if any.
    pub new_cursor: Option<CursorValue>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// The tolerated error, for skipped and warned runs.
    pub error: Option<String>,
    /// Classification of the tolerated error.
    pub error_kind: Option<ErrorKind>,
}

impl RunReport {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("outcome".to_string(), serde_json::json!(self.outcome.to_string()));
        map.insert(
            "final_state".to_string(),
            serde_json::json!(self.final_state.to_string()),
        );
        map.insert("rows_extracted".to_string(), serde_json::json!(self.rows_extracted));
        map.insert("rows_loaded".to_string(), serde_json::json!(self.rows_loaded));
        map.insert(
            "duration_ms".to_string(),
            serde_json::json!(u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)),
        );

        if let Some(state) = self.failed_in {
            map.insert("failed_in".to_string(), serde_json::json!(state.to_string()));
        }
        if let Some(cursor) = &self.previous_cursor {
            map.insert("previous_cursor".to_string(), cursor.clone());
        }
        if let Some(cursor) = &self.new_cursor {
            map.insert("new_cursor".to_string(), cursor.clone());
        }
        if let Some(error) = &self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        if let Some(kind) = self.error_kind {
            map.insert("error_kind".to_string(), serde_json::json!(kind.to_string()));
        }

        map
    }
}

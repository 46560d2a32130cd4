//! The run state machine.

use crate::errors::{EtlflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// The state of a pipeline run.
///
/// Legal transitions form a straight line
/// `Init → Extracting → Transforming → Loading → Committing → Done`,
/// plus `Failed` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Resolving components and the effective cursor.
    Init,
    /// Running the extractor.
    Extracting,
    /// Running the transform chain.
    Transforming,
    /// Running the loader.
    Loading,
    /// Persisting the new cursor.
    Committing,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl RunState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state that follows on success, if any.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Extracting),
            Self::Extracting => Some(Self::Transforming),
            Self::Transforming => Some(Self::Loading),
            Self::Loading => Some(Self::Committing),
            Self::Committing => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns true if `self → next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }

    /// Lowercase stage label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Extracting => "extract",
            Self::Transforming => "transform",
            Self::Loading => "load",
            Self::Committing => "commit",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::Extracting => "EXTRACTING",
            Self::Transforming => "TRANSFORMING",
            Self::Loading => "LOADING",
            Self::Committing => "COMMITTING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Tracks the current state of one run and when each state was entered.
#[derive(Debug)]
pub struct RunLifecycle {
    state: RunState,
    entered_at: Instant,
    history: Vec<(RunState, Duration)>,
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLifecycle {
    /// Starts a lifecycle in `Init`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RunState::Init,
            entered_at: Instant::now(),
            history: Vec::new(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::InvalidTransition`] for an illegal move; the
    /// current state is unchanged.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(EtlflowError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let now = Instant::now();
        self.history
            .push((self.state, now.duration_since(self.entered_at)));
        tracing::debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
        self.entered_at = now;
        Ok(())
    }

    /// Moves to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Err(e) = self.advance(RunState::Failed) {
            tracing::debug!(state = %self.state, error = %e, "Could not mark run failed");
        }
    }

    /// States left so far, with the time spent in each.
    #[must_use]
    pub fn history(&self) -> &[(RunState, Duration)] {
        &self.history
    }
}

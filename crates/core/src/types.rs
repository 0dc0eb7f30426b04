use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WaterfallError;

/// Unique identifier for a waterfall run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a run currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no step started yet
    Idle,
    /// The step at `step` is in flight
    Running { step: usize },
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached one of its three terminal states
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Terminal result delivered to the final callback.
///
/// Exactly one of these reaches the caller per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// Every step succeeded; carries the last step's results
    /// (or `T::default()` for an empty step list).
    Completed(T),
    /// A step reported this error; no later step ran.
    Failed(E),
    /// The run was terminated from outside before it finished.
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The status a run ends in when it produces this outcome
    pub fn status(&self) -> RunStatus {
        match self {
            Outcome::Completed(_) => RunStatus::Completed,
            Outcome::Failed(_) => RunStatus::Failed,
            Outcome::Cancelled => RunStatus::Cancelled,
        }
    }

    /// Collapse into a `Result`, treating cancellation as an error.
    pub fn into_result(self) -> Result<T, WaterfallError<E>> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(error) => Err(WaterfallError::Step(error)),
            Outcome::Cancelled => Err(WaterfallError::Cancelled),
        }
    }
}

//! Error types for waterfall runs.

/// Error view of a run that did not complete.
///
/// Produced by [`Outcome::into_result`](crate::Outcome::into_result); the
/// step's own error is carried through untouched.
#[derive(Debug, thiserror::Error)]
pub enum WaterfallError<E> {
    /// A step reported an error.
    #[error("step failed: {0}")]
    Step(E),

    /// The run was terminated before it finished.
    #[error("run was cancelled")]
    Cancelled,
}

impl<E> WaterfallError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The step error, if this is one.
    pub fn into_step_error(self) -> Option<E> {
        match self {
            Self::Step(error) => Some(error),
            Self::Cancelled => None,
        }
    }
}

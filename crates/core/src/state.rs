use crate::step::{Canceller, Step};
use crate::types::{Outcome, RunId, RunStatus};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Cancellation handles of the steps currently in flight, keyed by step index.
///
/// An entry exists from the moment a step starts until its completion is
/// processed or the run aborts. The value is `None` while the step is still
/// being invoked, or when the step did not hand back a handle.
pub(crate) type Jobs = BTreeMap<usize, Option<Canceller>>;

pub(crate) type FinalCallback<T, E> = Box<dyn FnOnce(Outcome<T, E>) + Send>;

/// Mutable record of one run. Never shared between runs.
pub(crate) struct RunState<T, E> {
    pub(crate) index: usize,
    pub(crate) size: usize,
    pub(crate) jobs: Jobs,
    pub(crate) status: RunStatus,
    /// Steps not yet started, front is the step at `index`
    pub(crate) pending: VecDeque<Step<T, E>>,
    /// Taken by whichever path delivers the terminal outcome
    pub(crate) callback: Option<FinalCallback<T, E>>,
}

/// A run: its identity plus its state behind a single lock.
///
/// The continuation chain and every [`Terminator`](crate::Terminator) of the
/// run hold this by `Arc`. The lock is never held while a step, a
/// cancellation handle or the final callback runs.
pub(crate) struct Run<T, E> {
    pub(crate) id: RunId,
    state: Mutex<RunState<T, E>>,
}

impl<T, E> Run<T, E> {
    pub(crate) fn new(steps: Vec<Step<T, E>>, callback: FinalCallback<T, E>) -> Self {
        let size = steps.len();
        Self {
            id: RunId::new(),
            state: Mutex::new(RunState {
                index: 0,
                size,
                jobs: Jobs::new(),
                status: RunStatus::Idle,
                pending: steps.into(),
                callback: Some(callback),
            }),
        }
    }

    /// Lock the run state. A panic in another holder does not leave the
    /// state half-written, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RunState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

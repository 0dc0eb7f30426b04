use crate::abort::abort;
use crate::callback::AsyncCallback;
use crate::defer::{defer, try_defer};
use crate::state::{Run, RunState};
use crate::step::Step;
use crate::terminator::Terminator;
use crate::types::{Outcome, RunStatus};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Completion handle given to each step.
///
/// Completing is always observed on a later turn than the one the step was
/// started in. Clones may be completed too; only the first completion of a
/// step counts, later ones and any arriving after the run ended are ignored.
///
/// Dropping every clone without completing abandons the step: if it is
/// still the active one, the run ends with [`Outcome::Cancelled`].
pub struct Done<T, E> {
    callback: AsyncCallback<Result<T, E>>,
    guard: Arc<AbandonGuard>,
}

/// Shared by all clones of one step's [`Done`]; fires when the last goes away.
struct AbandonGuard {
    completed: AtomicBool,
    on_abandon: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        let on_abandon = self
            .on_abandon
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_abandon) = on_abandon {
            // may be dropped while the run lock is held, so never lock here
            try_defer(on_abandon);
        }
    }
}

impl<T, E> Clone for Done<T, E> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Done<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("completed", &self.guard.completed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<T, E> Done<T, E>
where
    T: Default + Send + 'static,
    E: Send + 'static,
{
    fn new(run: Arc<Run<T, E>>, key: usize) -> Self {
        let abandoned = run.clone();
        Self {
            callback: AsyncCallback::new(move |result| complete(&run, key, result)),
            guard: Arc::new(AbandonGuard {
                completed: AtomicBool::new(false),
                on_abandon: Mutex::new(Some(Box::new(move || abandon(&abandoned, key)))),
            }),
        }
    }
}

impl<T, E> Done<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Report the step's outcome; `Ok` results are passed to the next step.
    pub fn complete(self, result: Result<T, E>) {
        self.guard.completed.store(true, Ordering::Release);
        self.callback.call(result);
    }

    pub fn succeed(self, results: T) {
        self.complete(Ok(results));
    }

    pub fn fail(self, error: E) {
        self.complete(Err(error));
    }
}

/// Run `steps` one after another, feeding each step's results into the next.
///
/// The first step is started before this returns. `callback` receives the
/// last step's results, the first error, or [`Outcome::Cancelled`] if the
/// returned [`Terminator`] stopped the run. It is invoked exactly once and
/// never from inside this call.
///
/// Must be called inside a Tokio runtime.
pub fn waterfall<T, E, F>(steps: Vec<Step<T, E>>, callback: F) -> Terminator
where
    T: Default + Send + 'static,
    E: Send + 'static,
    F: FnOnce(Outcome<T, E>) + Send + 'static,
{
    let size = steps.len();
    let run = Arc::new(Run::new(steps, Box::new(callback)));
    let terminator = Terminator::new(run.clone());

    tracing::info!("Starting waterfall: run_id={}, steps={}", run.id, size);

    if size == 0 {
        // nothing to start, still finish on a later turn
        defer(move || advance(&run, run.lock(), T::default()));
    } else {
        advance(&run, run.lock(), T::default());
    }

    terminator
}

/// [`waterfall`] with the outcome delivered through a future.
pub fn waterfall_async<T, E>(steps: Vec<Step<T, E>>) -> (Terminator, RunHandle<T, E>)
where
    T: Default + Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let terminator = waterfall(steps, move |outcome| {
        let _ = tx.send(outcome);
    });

    (terminator, RunHandle { rx })
}

/// Resolves to the outcome of a run started with [`waterfall_async`].
///
/// A run whose active step drops its [`Done`] without completing resolves
/// to [`Outcome::Cancelled`].
#[derive(Debug)]
pub struct RunHandle<T, E> {
    rx: oneshot::Receiver<Outcome<T, E>>,
}

impl<T, E> Future for RunHandle<T, E> {
    type Output = Outcome<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Outcome::Cancelled))
    }
}

/// Start the step at `state.index`, or finish the run when none is left.
///
/// Consumes the guard so that moving on from a completed step and
/// registering the next one happen in one critical section.
fn advance<T, E>(run: &Arc<Run<T, E>>, mut state: MutexGuard<'_, RunState<T, E>>, args: T)
where
    T: Default + Send + 'static,
    E: Send + 'static,
{
    let key = state.index;
    let task = if key < state.size {
        state.pending.pop_front()
    } else {
        None
    };

    let Some(task) = task else {
        let callback = state.callback.take();
        if callback.is_some() {
            state.status = RunStatus::Completed;
        }
        drop(state);

        if let Some(callback) = callback {
            tracing::info!("Waterfall completed: run_id={}", run.id);
            callback(Outcome::Completed(args));
        }
        return;
    };

    // registered before the step runs so its completion always finds it
    state.jobs.insert(key, None);
    state.status = RunStatus::Running { step: key };
    drop(state);

    tracing::debug!("Starting step {}: run_id={}", key, run.id);

    let done = Done::new(run.clone(), key);
    let handle = task(args, done);

    let mut state = run.lock();
    if let Some(slot) = state.jobs.get_mut(&key) {
        *slot = handle;
    } else if state.status == RunStatus::Cancelled {
        // terminated while the step was being started
        drop(state);
        if let Some(handle) = handle {
            tracing::debug!("Cancelling step {} started during termination", key);
            handle.cancel();
        }
    }
}

/// Per-step completion, delivered through the step's [`AsyncCallback`].
fn complete<T, E>(run: &Arc<Run<T, E>>, key: usize, result: Result<T, E>)
where
    T: Default + Send + 'static,
    E: Send + 'static,
{
    let mut state = run.lock();

    if state.jobs.remove(&key).is_none() {
        tracing::debug!(
            "Ignoring completion of step {} that is no longer active: run_id={}",
            key,
            run.id
        );
        return;
    }

    match result {
        Ok(results) => {
            tracing::debug!("Step {} completed: run_id={}", key, run.id);
            state.index += 1;
            advance(run, state, results);
        }
        Err(error) => {
            state.status = RunStatus::Failed;
            let callback = state.callback.take();
            let cancelled = abort(state, run.id);

            tracing::warn!(
                "Waterfall failed at step {}: run_id={}, cancelled_jobs={}",
                key,
                run.id,
                cancelled
            );

            if let Some(callback) = callback {
                callback(Outcome::Failed(error));
            }
        }
    }
}

/// The active step dropped its [`Done`] uncompleted; end the run as cancelled.
fn abandon<T, E>(run: &Arc<Run<T, E>>, key: usize)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let mut state = run.lock();

    // already completed elsewhere, or the run was aborted
    if !state.jobs.contains_key(&key) {
        return;
    }

    state.index = state.size;
    state.status = RunStatus::Cancelled;
    let callback = state.callback.take();
    let cancelled = abort(state, run.id);

    tracing::warn!(
        "Step {} dropped its completion handle: run_id={}, cancelled_jobs={}",
        key,
        run.id,
        cancelled
    );

    if let Some(callback) = callback {
        callback(Outcome::Cancelled);
    }
}

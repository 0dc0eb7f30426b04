//! Steps and their cancellation handles.

use crate::sequencer::Done;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A unit of work in a waterfall.
///
/// Receives the previous step's results (or `T::default()` for the first
/// step) and a [`Done`] handle it must complete exactly once. May hand back a
/// [`Canceller`] that stops its pending work.
pub type Step<T, E> = Box<dyn FnOnce(T, Done<T, E>) -> Option<Canceller> + Send>;

/// Box a closure into a [`Step`].
pub fn step<T, E, F>(f: F) -> Step<T, E>
where
    F: FnOnce(T, Done<T, E>) -> Option<Canceller> + Send + 'static,
{
    Box::new(f)
}

/// Build a step from an async function.
///
/// The future runs as its own Tokio task; its result completes the step, and
/// aborting the task is the step's cancellation.
pub fn future_step<T, E, F, Fut>(f: F) -> Step<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move |input, done| {
        let handle = tokio::spawn(async move {
            let result = f(input).await;
            done.complete(result);
        });
        Some(Canceller::from(handle))
    })
}

/// Best-effort request to stop a step's pending work.
pub struct Canceller(Box<dyn FnOnce() + Send>);

impl Canceller {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn cancel(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Canceller")
    }
}

impl<R: Send + 'static> From<JoinHandle<R>> for Canceller {
    fn from(handle: JoinHandle<R>) -> Self {
        Self::new(move || handle.abort())
    }
}

impl From<CancellationToken> for Canceller {
    fn from(token: CancellationToken) -> Self {
        Self::new(move || token.cancel())
    }
}

use crate::abort::abort;
use crate::defer::defer;
use crate::state::Run;
use crate::types::{Outcome, RunId, RunStatus};
use std::sync::Arc;

/// Control surface of a run, independent of its payload types.
trait RunControl: Send + Sync {
    fn id(&self) -> RunId;
    fn status(&self) -> RunStatus;
    fn terminate(&self) -> bool;
}

impl<T, E> RunControl for Run<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn id(&self) -> RunId {
        self.id
    }

    fn status(&self) -> RunStatus {
        self.lock().status
    }

    fn terminate(&self) -> bool {
        let mut state = self.lock();

        // finished, or nothing in flight to stop
        if state.jobs.is_empty() {
            return false;
        }

        // no further step may start, whatever completes from here on
        state.index = state.size;
        state.status = RunStatus::Cancelled;
        let callback = state.callback.take();
        let cancelled = abort(state, self.id);

        tracing::info!(
            "Waterfall terminated: run_id={}, cancelled_jobs={}",
            self.id,
            cancelled
        );

        if let Some(callback) = callback {
            defer(move || callback(Outcome::Cancelled));
        }

        true
    }
}

/// Handle to stop an in-flight run from outside.
///
/// Returned by [`waterfall`](crate::waterfall). Clones control the same run.
#[derive(Clone)]
pub struct Terminator {
    run: Arc<dyn RunControl>,
}

impl Terminator {
    pub(crate) fn new<T, E>(run: Arc<Run<T, E>>) -> Self
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        Self { run }
    }

    /// Cancel the active step and end the run with [`Outcome::Cancelled`],
    /// delivered on a later turn.
    ///
    /// Does nothing when no step is active, so calling it twice or after the
    /// run finished is harmless. Returns whether this call ended the run.
    pub fn terminate(&self) -> bool {
        self.run.terminate()
    }

    pub fn run_id(&self) -> RunId {
        self.run.id()
    }

    pub fn status(&self) -> RunStatus {
        self.run.status()
    }
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminator")
            .field("run_id", &self.run_id())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::step::{step, Canceller, Step};
    use crate::types::{Outcome, RunStatus};
    use crate::{waterfall, waterfall_async, Done};
    use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn slow(
        ms: u64,
        done: Done<String, anyhow::Error>,
        value: &str,
    ) -> Option<Canceller> {
        let value = value.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            done.succeed(value);
        });
        Some(Canceller::from(handle))
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_before_first_step_completes() {
        let calls = Arc::new(AtomicI32::new(0));
        let second_ran = Arc::new(AtomicBool::new(false));

        let c = calls.clone();
        let ran = second_ran.clone();
        let steps: Vec<Step<String, anyhow::Error>> = vec![
            step(move |_, done| {
                c.fetch_add(1, Ordering::SeqCst);
                let done_later = done.clone();
                let counter = c.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    done_later.succeed("step1".to_string());
                });
                drop(done);
                Some(Canceller::new(move || {
                    counter.fetch_sub(1, Ordering::SeqCst);
                }))
            }),
            step(move |msg, done| {
                ran.store(true, Ordering::SeqCst);
                done.succeed(msg);
                None
            }),
        ];

        let (terminator, outcome) = waterfall_async(steps);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(terminator.status(), RunStatus::Running { step: 0 });
        assert!(terminator.terminate());

        assert!(outcome.await.is_cancelled());
        assert_eq!(terminator.status(), RunStatus::Cancelled);

        // let the abandoned step's own timer fire; it must be ignored
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!second_ran.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_is_idempotent() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let count = deliveries.clone();

        let steps: Vec<Step<String, anyhow::Error>> =
            vec![step(|_, done| slow(1_000, done, "never"))];
        let terminator = waterfall(steps, move |outcome| {
            assert!(outcome.is_cancelled());
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(terminator.terminate());
        assert!(!terminator.terminate());
        assert!(!terminator.clone().terminate());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_after_completion_has_no_effect() {
        let deliveries = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let count = deliveries.clone();

        let steps: Vec<Step<String, anyhow::Error>> =
            vec![step(|_, done| slow(1, done, "done"))];
        let terminator = waterfall(steps, move |outcome| {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.into_result().unwrap(), "done");

        assert!(!terminator.terminate());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
        assert_eq!(terminator.status(), RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_after_failure_has_no_effect() {
        let steps: Vec<Step<String, anyhow::Error>> = vec![step(|_, done| {
            done.fail(anyhow::anyhow!("nope"));
            None
        })];

        let (terminator, outcome) = waterfall_async(steps);
        assert!(outcome.await.is_failed());
        assert!(!terminator.terminate());
        assert_eq!(terminator.status(), RunStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_on_empty_list_is_a_no_op() {
        let (terminator, outcome) = waterfall_async(Vec::<Step<String, anyhow::Error>>::new());
        assert!(!terminator.terminate());
        assert!(matches!(outcome.await, Outcome::Completed(ref s) if s.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_delivered_asynchronously() {
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = delivered.clone();

        let steps: Vec<Step<String, anyhow::Error>> =
            vec![step(|_, done| slow(1_000, done, "never"))];
        let terminator = waterfall(steps, move |_| flag.store(true, Ordering::SeqCst));

        terminator.terminate();
        assert!(!delivered.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(delivered.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_from_inside_a_step() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let slot: Arc<std::sync::Mutex<Option<crate::Terminator>>> = Default::default();

        let flag = cancelled.clone();
        let inner_slot = slot.clone();
        let steps: Vec<Step<String, anyhow::Error>> = vec![
            step(|_, done| slow(1, done, "first")),
            step(move |_, _done| {
                if let Some(terminator) = inner_slot.lock().unwrap().as_ref() {
                    terminator.terminate();
                }
                Some(Canceller::new(move || flag.store(true, Ordering::SeqCst)))
            }),
        ];

        let (terminator, outcome) = waterfall_async(steps);
        *slot.lock().unwrap() = Some(terminator);

        assert!(outcome.await.is_cancelled());
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    #[should_panic(expected = "cancel failed")]
    async fn test_panicking_canceller_propagates_from_terminate() {
        let steps: Vec<Step<String, anyhow::Error>> = vec![step(|_, done| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                done.succeed("late".to_string());
            });
            Some(Canceller::new(|| panic!("cancel failed")))
        })];

        let terminator = waterfall(steps, |_| {});
        terminator.terminate();
    }
}

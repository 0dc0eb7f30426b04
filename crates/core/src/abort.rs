use crate::state::RunState;
use crate::types::RunId;
use std::sync::MutexGuard;

/// Cancel every step still tracked in `state.jobs` and clear the tracking.
///
/// Takes the lock guard so that clearing happens in the same critical
/// section the caller used to decide on aborting; the handles themselves run
/// after the lock is released, since they may call back into the run.
/// Fire-and-forget: nothing waits for a step to actually stop. A panicking
/// handle propagates to the caller and the remaining handles are dropped
/// uncalled. `index` and `size` are left alone.
///
/// Returns how many handles were invoked.
pub(crate) fn abort<T, E>(mut state: MutexGuard<'_, RunState<T, E>>, run_id: RunId) -> usize {
    let jobs = std::mem::take(&mut state.jobs);
    drop(state);

    let mut cancelled = 0;
    for (step, handle) in jobs {
        if let Some(handle) = handle {
            tracing::debug!("Cancelling in-flight step {}: run_id={}", step, run_id);
            handle.cancel();
            cancelled += 1;
        }
    }

    cancelled
}

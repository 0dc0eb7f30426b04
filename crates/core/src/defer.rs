//! Deferral onto a later turn of the runtime.

/// Schedule `f` to run after the current synchronous context has returned.
///
/// `f` is handed to the ambient Tokio runtime as its own task, so it never
/// runs on the caller's stack. A panic inside `f` surfaces through that
/// task, not through the caller of `defer`.
///
/// # Panics
///
/// Panics when called outside of a Tokio runtime, like `tokio::spawn`.
pub fn defer<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move { f() });
}

/// Like [`defer`], but drops `f` instead of panicking when no Tokio runtime
/// is reachable. Returns whether `f` was scheduled.
pub fn try_defer<F>(f: F) -> bool
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { f() });
            true
        }
        Err(_) => false,
    }
}

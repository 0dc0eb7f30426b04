//! Async-safe callback wrapper.
//!
//! A step may report completion before the call that started it has even
//! returned. [`AsyncCallback`] normalises that: completions arriving while the
//! wrapper is still in its synchronous window are pushed to a later turn,
//! completions arriving afterwards are delivered immediately.

use crate::defer::defer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wraps a callback so it is never invoked in the turn the wrapper was created in.
pub struct AsyncCallback<A> {
    callback: Arc<dyn Fn(A) + Send + Sync>,
    is_async: Arc<AtomicBool>,
}

impl<A> Clone for AsyncCallback<A> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback.clone(),
            is_async: self.is_async.clone(),
        }
    }
}

impl<A> std::fmt::Debug for AsyncCallback<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCallback")
            .field("is_async", &self.is_async())
            .finish_non_exhaustive()
    }
}

impl<A> AsyncCallback<A> {
    /// Whether the synchronous window has closed
    pub fn is_async(&self) -> bool {
        self.is_async.load(Ordering::Acquire)
    }
}

impl<A: Send + 'static> AsyncCallback<A> {
    /// Wrap `callback`, opening the synchronous window.
    ///
    /// The window closes once a deferred marker scheduled here has run. Must
    /// be called inside a Tokio runtime.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        let is_async = Arc::new(AtomicBool::new(false));
        let marker = is_async.clone();
        defer(move || marker.store(true, Ordering::Release));

        Self {
            callback: Arc::new(callback),
            is_async,
        }
    }

    /// Deliver `args` to the wrapped callback.
    ///
    /// Runs the callback inline once the synchronous window has closed,
    /// otherwise defers it. Either way it runs exactly once per call, with
    /// `args` untouched.
    pub fn call(&self, args: A) {
        if self.is_async() {
            (self.callback)(args);
        } else {
            let callback = self.callback.clone();
            defer(move || callback(args));
        }
    }
}

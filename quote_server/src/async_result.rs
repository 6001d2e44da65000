//! Two-phase asynchronous operation token.
//!
//! An operation is started by a `begin_*` function that returns an
//! `Arc<AsyncResult<T, X>>` right away and finished by an `end_*` function that calls
//! [`AsyncResult::end`] to collect the outcome. Between the two, the party performing the
//! work calls [`AsyncResult::complete`] exactly once, from any thread.
//!
//! Completion can be observed three ways:
//! - polling [`AsyncResult::is_completed`];
//! - blocking in [`AsyncResult::end`] (or on [`AsyncResult::wait_handle`]);
//! - the callback passed at creation, invoked exactly once after completion is recorded.
//!
//! `completed_synchronously` tells a driving loop that the work finished before the
//! `begin_*` call returned, so the continuation can run inline instead of from the
//! callback.
//!
//! The extension slot `X` carries data specific to one kind of operation (a sequence
//! number, a resource to release at `end`), the way a subclass would add fields.
//!
//! Completing twice or ending twice is a programming error and panics.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quote_common::Result;

/// Continuation invoked once when the operation completes.
pub type AsyncCallback<T, X = ()> = Box<dyn FnOnce(&Arc<AsyncResult<T, X>>) + Send>;

/// Opaque caller context carried by a token.
pub type AsyncState = Arc<dyn Any + Send + Sync>;

/// Event that stays signaled once set.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetEvent {
    /// Create an event, optionally already signaled.
    pub fn new(signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            cond: Condvar::new(),
        }
    }

    /// Signal the event and release every waiter.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.cond.notify_all();
    }

    /// Whether the event has been signaled.
    pub fn is_set(&self) -> bool {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the event is signaled.
    pub fn wait(&self) {
        let signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let _signaled = self
            .cond
            .wait_while(signaled, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until signaled or `timeout` elapses; returns whether the event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (signaled, _) = self
            .cond
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);
        *signaled
    }
}

struct Completion<T> {
    is_completed: bool,
    completed_synchronously: bool,
    end_called: bool,
    outcome: Option<Result<T>>,
    // created only when someone has to block
    event: Option<Arc<ManualResetEvent>>,
}

/// Token for one in-flight operation producing `T`.
pub struct AsyncResult<T, X = ()> {
    completion: Mutex<Completion<T>>,
    callback: Mutex<Option<AsyncCallback<T, X>>>,
    has_callback: bool,
    state: Option<AsyncState>,
    ext: X,
}

impl<T, X> AsyncResult<T, X> {
    /// Create a pending token.
    pub fn new(
        callback: Option<AsyncCallback<T, X>>,
        state: Option<AsyncState>,
        ext: X,
    ) -> Arc<Self> {
        Arc::new(Self {
            completion: Mutex::new(Completion {
                is_completed: false,
                completed_synchronously: false,
                end_called: false,
                outcome: None,
                event: None,
            }),
            has_callback: callback.is_some(),
            callback: Mutex::new(callback),
            state,
            ext,
        })
    }

    /// Record the outcome, wake any blocked `end`, then run the callback.
    ///
    /// The callback runs after every lock of this token has been released, so it may
    /// call [`AsyncResult::end`] on the same token.
    ///
    /// # Panics
    /// If the token was already completed.
    pub fn complete(self: &Arc<Self>, completed_synchronously: bool, outcome: Result<T>) {
        {
            let mut completion = self.lock_completion();
            assert!(!completion.is_completed, "AsyncResult completed twice");
            completion.completed_synchronously = completed_synchronously;
            completion.outcome = Some(outcome);
            completion.is_completed = true;
            if let Some(event) = &completion.event {
                event.set();
            }
        }

        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Wait for completion and hand back the outcome, including a captured failure.
    ///
    /// Typed tokens make a wrong-kind `end` impossible, so only double-ending is checked.
    ///
    /// # Panics
    /// If `end` was already called on this token.
    pub fn end(self: &Arc<Self>) -> Result<T> {
        let pending = {
            let mut completion = self.lock_completion();
            assert!(!completion.end_called, "AsyncResult already ended");
            completion.end_called = true;
            if completion.is_completed {
                None
            } else {
                Some(Self::event_locked(&mut completion))
            }
        };
        if let Some(event) = pending {
            event.wait();
        }

        let mut completion = self.lock_completion();
        completion.event = None;
        match completion.outcome.take() {
            Some(outcome) => outcome,
            None => unreachable!("completed AsyncResult without an outcome"),
        }
    }

    /// Handle for blocking until completion; created on first request.
    pub fn wait_handle(&self) -> Arc<ManualResetEvent> {
        let mut completion = self.lock_completion();
        Self::event_locked(&mut completion)
    }

    /// Whether `complete` has run.
    pub fn is_completed(&self) -> bool {
        self.lock_completion().is_completed
    }

    /// Whether the operation finished before its `begin_*` call returned.
    pub fn completed_synchronously(&self) -> bool {
        self.lock_completion().completed_synchronously
    }

    /// Whether a callback was supplied at creation.
    pub fn has_callback(&self) -> bool {
        self.has_callback
    }

    /// Caller context supplied at creation.
    pub fn async_state(&self) -> Option<&AsyncState> {
        self.state.as_ref()
    }

    /// Operation-specific data.
    pub fn ext(&self) -> &X {
        &self.ext
    }

    fn event_locked(completion: &mut Completion<T>) -> Arc<ManualResetEvent> {
        let signaled = completion.is_completed;
        Arc::clone(
            completion
                .event
                .get_or_insert_with(|| Arc::new(ManualResetEvent::new(signaled))),
        )
    }

    fn lock_completion(&self) -> MutexGuard<'_, Completion<T>> {
        self.completion.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, X: fmt::Debug> fmt::Debug for AsyncResult<T, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let completion = self.lock_completion();
        f.debug_struct("AsyncResult")
            .field("is_completed", &completion.is_completed)
            .field("completed_synchronously", &completion.completed_synchronously)
            .field("end_called", &completion.end_called)
            .field("has_callback", &self.has_callback)
            .field("ext", &self.ext)
            .finish()
    }
}

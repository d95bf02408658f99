//! # Futures
//!
//! A `Future` is the caller's view of one remote call: a single-assignment cell
//! that moves from `Pending` to exactly one of `Fulfilled`, `Failed` or
//! `Cancelled`, and never moves again.
//!
//! The writer side is a `Completer`, held by whatever can finish the call: the
//! connection pump when a reply arrives, the deadline timer, or the submit task
//! when a request cannot be sent. All of them race through the same mutex; the
//! first transition wins and every later one returns `false`.
//!
//! `wait` blocks the calling thread on a condition variable. It is meant for
//! plain threads, not for code running on the engine's own runtime.

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use alpharpc::RpcError;
use alpharpc::Val;

use crate::error::Error;
use crate::error::Result;

/// Observable state of a `Future`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Failed,
    Cancelled,
}

enum Outcome {
    Pending,
    Fulfilled(Val),
    Failed(Error),
    Cancelled(Error),
}

impl Outcome {
    fn state(&self) -> FutureState {
        match self {
            Outcome::Pending => FutureState::Pending,
            Outcome::Fulfilled(_) => FutureState::Fulfilled,
            Outcome::Failed(_) => FutureState::Failed,
            Outcome::Cancelled(_) => FutureState::Cancelled,
        }
    }

    fn settled(&self) -> Option<Result<Val>> {
        match self {
            Outcome::Pending => None,
            Outcome::Fulfilled(val) => Some(Ok(val.clone())),
            Outcome::Failed(e) | Outcome::Cancelled(e) => Some(Err(e.clone())),
        }
    }
}

/// Hook that forgets the in-flight call once nobody wants the reply.
enum Release {
    Waiting,
    Armed(Box<dyn FnOnce() + Send>),
    Done,
}

struct Slot {
    outcome: Mutex<Outcome>,
    ready: Condvar,
    release: Mutex<Release>,
}

impl Slot {
    fn outcome(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: Outcome) -> bool {
        let cancelled = matches!(next, Outcome::Cancelled(_));
        {
            let mut outcome = self.outcome();
            if !matches!(*outcome, Outcome::Pending) {
                return false;
            }
            *outcome = next;
        }
        self.ready.notify_all();
        if cancelled {
            self.release();
        }
        true
    }

    fn release(&self) {
        let previous = {
            let mut release = self.release.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *release, Release::Done)
        };
        if let Release::Armed(hook) = previous {
            hook();
        }
    }
}

/// Creates a connected `Future` / `Completer` pair.
pub(crate) fn pair<T>(convert: fn(Val) -> Result<T>) -> (Future<T>, Completer) {
    let slot = Arc::new(Slot {
        outcome: Mutex::new(Outcome::Pending),
        ready: Condvar::new(),
        release: Mutex::new(Release::Waiting),
    });
    let future = Future { slot: slot.clone(), convert, deadline: None };
    (future, Completer { slot })
}

/// Writer side of a `Future`.
#[derive(Clone)]
pub(crate) struct Completer {
    slot: Arc<Slot>,
}

impl Completer {
    pub fn fulfill(&self, val: Val) -> bool {
        self.slot.transition(Outcome::Fulfilled(val))
    }

    pub fn fail(&self, error: Error) -> bool {
        self.slot.transition(Outcome::Failed(error))
    }

    pub fn cancel(&self, error: Error) -> bool {
        self.slot.transition(Outcome::Cancelled(error))
    }

    pub fn settle(&self, result: Result<Val>) -> bool {
        match result {
            Ok(val) => self.fulfill(val),
            Err(e) => self.fail(e),
        }
    }

    /// Installs the hook that forgets the in-flight call. It runs once, on
    /// cancellation or when the `Future` is dropped unresolved; immediately if
    /// that has already happened.
    pub fn on_release(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut release = self.slot.release.lock().unwrap_or_else(PoisonError::into_inner);
            if !matches!(*release, Release::Done) {
                *release = Release::Armed(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

/// The pending result of a remote call.
pub struct Future<T> {
    slot: Arc<Slot>,
    convert: fn(Val) -> Result<T>,
    deadline: Option<Instant>,
}

impl<T> Future<T> {
    /// Bounds every wait on this future by `deadline`.
    pub(crate) fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn state(&self) -> FutureState {
        self.slot.outcome().state()
    }

    /// Returns `true` once the future has reached a terminal state. Never blocks.
    pub fn is_completed(&self) -> bool {
        self.state() != FutureState::Pending
    }

    /// Blocks until the call completes and returns its outcome.
    ///
    /// Once terminal, every call returns the same stored outcome.
    pub fn wait(&self) -> Result<T> {
        self.wait_until(self.deadline)
    }

    /// Like `wait`, but gives up after `timeout`.
    ///
    /// Giving up cancels the future with `Error::Timeout`; the request is not
    /// retracted and a reply arriving later is discarded.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let requested = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(own) => own.min(requested),
            None => requested,
        };
        self.wait_until(Some(deadline))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<T> {
        let mut outcome = self.slot.outcome();
        loop {
            if let Some(settled) = outcome.settled() {
                return settled.and_then(self.convert);
            }
            match deadline {
                None => {
                    outcome = self.slot.ready.wait(outcome).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    outcome = self
                        .slot
                        .ready
                        .wait_timeout(outcome, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        drop(outcome);

        // Lost the race only if a reply landed between the unlock and here.
        self.slot.transition(Outcome::Cancelled(Error::Timeout));
        let settled = self.slot.outcome().settled();
        settled.unwrap_or(Err(Error::Timeout)).and_then(self.convert)
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        if matches!(*self.slot.outcome(), Outcome::Pending) {
            self.slot.release();
        }
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("state", &self.state())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// The pending result of a call whose output is written into a caller buffer.
///
/// The provider sends the computed values back; `wait` copies them into the
/// buffer that was handed to `compute_sums` and reports success.
pub struct ScatterFuture<'a> {
    inner: Future<Vec<i32>>,
    out: &'a mut [i32],
}

impl<'a> ScatterFuture<'a> {
    pub(crate) fn new(inner: Future<Vec<i32>>, out: &'a mut [i32]) -> Self {
        Self { inner, out }
    }

    pub fn state(&self) -> FutureState {
        self.inner.state()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    pub fn wait(&mut self) -> Result<bool> {
        let values = self.inner.wait()?;
        self.scatter(values)
    }

    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<bool> {
        let values = self.inner.wait_timeout(timeout)?;
        self.scatter(values)
    }

    fn scatter(&mut self, values: Vec<i32>) -> Result<bool> {
        if values.len() != self.out.len() {
            return Err(Error::Rpc(RpcError::ProtocolViolation(format!(
                "{} values for a buffer of {}", values.len(), self.out.len()
            ))));
        }
        self.out.copy_from_slice(&values);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn s32_pair() -> (Future<i32>, Completer) {
        pair(|val| Ok(val.into_s32()?))
    }

    #[test]
    fn test_fulfill_then_wait() {
        let (future, completer) = s32_pair();
        assert_eq!(future.state(), FutureState::Pending);
        assert!(completer.fulfill(Val::S32(90)));
        assert_eq!(future.wait(), Ok(90));
        assert_eq!(future.state(), FutureState::Fulfilled);
    }

    #[test]
    fn test_only_first_transition_counts() {
        let (future, completer) = s32_pair();
        assert!(completer.fail(Error::ProviderShutdown));
        assert!(!completer.fulfill(Val::S32(1)));
        assert!(!completer.cancel(Error::Timeout));
        assert_eq!(future.wait(), Err(Error::ProviderShutdown));
        assert_eq!(future.state(), FutureState::Failed);
    }

    #[test]
    fn test_wait_wakes_on_completion_from_another_thread() {
        let (future, completer) = s32_pair();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.fulfill(Val::S32(7))
        });
        assert_eq!(future.wait(), Ok(7));
        assert!(writer.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_cancels_and_late_reply_is_ignored() {
        let (future, completer) = s32_pair();
        assert_eq!(future.wait_timeout(Duration::from_millis(10)), Err(Error::Timeout));
        assert_eq!(future.state(), FutureState::Cancelled);

        assert!(!completer.fulfill(Val::S32(90)));
        assert_eq!(future.wait(), Err(Error::Timeout));
        assert_eq!(future.state(), FutureState::Cancelled);
    }

    #[test]
    fn test_wait_timeout_returns_value_when_already_done() {
        let (future, completer) = s32_pair();
        completer.fulfill(Val::S32(3));
        assert_eq!(future.wait_timeout(Duration::ZERO), Ok(3));
    }

    #[test]
    fn test_deadline_bounds_plain_wait() {
        let (future, _completer) = s32_pair();
        let future = future.with_deadline(Instant::now() + Duration::from_millis(10));
        assert_eq!(future.wait(), Err(Error::Timeout));
        assert_eq!(future.state(), FutureState::Cancelled);
    }

    #[test]
    fn test_release_runs_on_cancel() {
        let (future, completer) = s32_pair();
        let (tx, rx) = std::sync::mpsc::channel();
        completer.on_release(move || tx.send(()).unwrap());
        assert!(rx.try_recv().is_err());
        let _ = future.wait_timeout(Duration::ZERO);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_release_runs_when_future_dropped_unresolved() {
        let (future, completer) = s32_pair();
        let (tx, rx) = std::sync::mpsc::channel();
        completer.on_release(move || tx.send(()).unwrap());
        drop(future);
        assert!(rx.try_recv().is_ok());
        // installing after the fact runs immediately
        let (tx, rx) = std::sync::mpsc::channel();
        completer.on_release(move || tx.send(()).unwrap());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_release_not_run_after_fulfill() {
        let (future, completer) = s32_pair();
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        completer.on_release(move || tx.send(()).unwrap());
        completer.fulfill(Val::S32(1));
        drop(future);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_conversion_failure_surfaces_as_error() {
        let (future, completer) = s32_pair();
        completer.fulfill(Val::Bool(true));
        assert!(matches!(future.wait(), Err(Error::Rpc(_))));
    }

    #[test]
    fn test_scatter_writes_into_caller_buffer() {
        let (future, completer) = pair(|val| Ok(val.into_s32_vec()?));
        let mut out = [0; 3];
        {
            let mut scatter = ScatterFuture::new(future, &mut out);
            completer.fulfill(Val::s32_list(&[5, 7, 9]));
            assert_eq!(scatter.wait(), Ok(true));
        }
        assert_eq!(out, [5, 7, 9]);
    }
}

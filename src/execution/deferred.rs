//! Deferred Results
//!
//! A single-resolution completion handle over a `tokio::sync::oneshot`
//! channel. A [`Completer`] resolves it exactly once; the [`Deferred`] side
//! is observed by exactly one consumer, either through a continuation
//! ([`Deferred::on_complete`]), by awaiting it, or by blocking on
//! [`Deferred::wait`].
//!
//! Dropping a completer without resolving it reports [`Abandoned`] to
//! whoever awaits or waits on the deferred. A registered continuation is
//! dropped with it instead of being called.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use log::debug;
use thiserror::Error;
use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::error::BoxError;

type Continuation<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Continuation registered through [`Deferred::on_complete`], shared by both
/// halves so the completer can hand the result over without the channel.
type Slot<T, E> = Arc<Mutex<Option<Continuation<T, E>>>>;

fn lock<T, E>(slot: &Slot<T, E>) -> MutexGuard<'_, Option<Continuation<T, E>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The completer was dropped before it resolved the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the deferred value was abandoned before it resolved")]
pub struct Abandoned;

/// Creates a connected completer/deferred pair.
///
/// # Example
///
/// ```
/// use workflowlite::execution::deferred;
/// use workflowlite::BoxError;
///
/// let (completer, pending) = deferred::<u32, BoxError>();
/// std::thread::spawn(move || completer.resolve(7));
/// assert_eq!(pending.wait().unwrap(), 7);
/// ```
pub fn deferred<T, E>() -> (Completer<T, E>, Deferred<T, E>) {
    let (sender, receiver) = oneshot::channel();
    let slot: Slot<T, E> = Arc::new(Mutex::new(None));

    (
        Completer {
            sender,
            slot: Arc::clone(&slot),
        },
        Deferred { receiver, slot },
    )
}

/// The observing half of a completion handle.
pub struct Deferred<T, E = BoxError> {
    receiver: oneshot::Receiver<Result<T, E>>,
    slot: Slot<T, E>,
}

impl<T, E> Deferred<T, E> {
    /// Creates a handle that already holds a value.
    pub fn resolved(value: T) -> Self {
        let (completer, handle) = deferred();
        completer.resolve(value);
        handle
    }

    /// Creates a handle that already holds a failure.
    pub fn failed(error: E) -> Self {
        let (completer, handle) = deferred();
        completer.fail(error);
        handle
    }

    /// Registers a continuation that receives `state` and the result.
    ///
    /// If the result is already available nothing is registered and the
    /// state is handed back together with the result, so the caller can
    /// carry on in its own frame instead of nesting a call. Otherwise the
    /// continuation runs on the thread that completes the handle.
    pub fn on_complete<S, F>(mut self, state: S, resume: F) -> Option<(S, Result<T, E>)>
    where
        S: Send + 'static,
        F: FnOnce(S, Result<T, E>) + Send + 'static,
        T: 'static,
        E: From<Abandoned> + 'static,
    {
        // Held across the check so a concurrent completer either finds the
        // continuation or has already sent through the channel.
        let mut slot = lock(&self.slot);
        match self.receiver.try_recv() {
            Ok(result) => Some((state, result)),
            Err(TryRecvError::Closed) => Some((state, Err(Abandoned.into()))),
            Err(TryRecvError::Empty) => {
                *slot = Some(Box::new(move |result| resume(state, result)));
                None
            }
        }
    }

    /// Blocks the current thread until the result is available.
    ///
    /// Panics when called from within an async runtime; await the handle there.
    pub fn wait(self) -> Result<T, E>
    where
        E: From<Abandoned>,
    {
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(Abandoned.into()))
    }
}

impl<T, E> Future for Deferred<T, E>
where
    E: From<Abandoned>,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Abandoned.into())))
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

/// The resolving half of a completion handle.
///
/// Completing consumes the completer, so a handle is resolved at most once.
pub struct Completer<T, E = BoxError> {
    sender: oneshot::Sender<Result<T, E>>,
    slot: Slot<T, E>,
}

impl<T, E> Completer<T, E> {
    /// Resolves the handle with a value.
    pub fn resolve(self, value: T) {
        self.complete(Ok(value));
    }

    /// Resolves the handle with a failure.
    pub fn fail(self, error: E) {
        self.complete(Err(error));
    }

    /// Resolves the handle, running a registered continuation inline.
    pub fn complete(self, result: Result<T, E>) {
        let mut slot = lock(&self.slot);
        match slot.take() {
            Some(resume) => {
                drop(slot);
                resume(result);
            }
            None => {
                if self.sender.send(result).is_err() {
                    debug!("deferred value resolved after its observer was dropped");
                }
            }
        }
    }
}

impl<T, E> fmt::Debug for Completer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}

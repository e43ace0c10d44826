//! One-shot promise/future pair used to hand task results back to submitters.
//!
//! A [`Promise`] is the write side: it is moved into the task closure and
//! fulfilled exactly once. The matching [`JobFuture`] is the read side: the
//! submitter can block on it, poll it, or `.await` it. Both ends sit on a
//! `futures` oneshot channel.
//!
//! ```rust
//! use rust_job_system::core::promise;
//!
//! let (promise, future) = promise::<u32>();
//! std::thread::spawn(move || promise.resolve(2 + 2));
//! assert_eq!(future.wait().unwrap(), 4);
//! ```

use crate::core::error::{JobError, Result};
use futures::channel::oneshot;
use futures::task::{self as futures_task, ArcWake};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Create a connected promise/future pair.
pub fn promise<T>() -> (Promise<T>, JobFuture<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Promise { sender },
        JobFuture {
            receiver: Some(receiver),
            result: None,
        },
    )
}

/// Write side of a one-shot result slot.
///
/// Dropping a promise without fulfilling it cancels the channel, which
/// resolves the future with [`JobError::Abandoned`], so a cancelled task never
/// leaves a waiter hanging.
pub struct Promise<T> {
    sender: oneshot::Sender<Result<T>>,
}

impl<T> Promise<T> {
    /// Complete the promise with a result.
    pub fn fulfil(self, result: Result<T>) {
        // Nobody listening any more is not an error for the task.
        let _ = self.sender.send(result);
    }

    /// Complete the promise with a value.
    pub fn resolve(self, value: T) {
        self.fulfil(Ok(value));
    }

    /// Complete the promise with an error.
    pub fn reject(self, error: JobError) {
        self.fulfil(Err(error));
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("future_dropped", &self.sender.is_canceled())
            .finish()
    }
}

/// Read side of a one-shot result slot.
///
/// The result can be taken exactly once, by [`wait`](Self::wait),
/// [`wait_timeout`](Self::wait_timeout), [`try_take`](Self::try_take) or by
/// awaiting the future.
pub struct JobFuture<T> {
    receiver: Option<oneshot::Receiver<Result<T>>>,
    result: Option<Result<T>>,
}

// Nothing inside is ever pinned.
impl<T> Unpin for JobFuture<T> {}

/// Wakes a thread parked in [`JobFuture::wait_timeout`].
struct Unparker(Thread);

impl ArcWake for Unparker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.unpark();
    }
}

impl<T> JobFuture<T> {
    /// Returns true once a result is available and has not been taken yet.
    pub fn is_ready(&mut self) -> bool {
        let mut cx = Context::from_waker(futures_task::noop_waker_ref());
        self.poll_receiver(&mut cx).is_ready() && self.result.is_some()
    }

    /// Take the result without blocking.
    ///
    /// Returns `None` while the task is still pending, and also after the
    /// result has already been taken.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        let mut cx = Context::from_waker(futures_task::noop_waker_ref());
        match self.poll_receiver(&mut cx) {
            Poll::Ready(()) => self.result.take(),
            Poll::Pending => None,
        }
    }

    /// Block the calling thread until the result is available.
    pub fn wait(mut self) -> Result<T> {
        futures::executor::block_on(&mut self)
    }

    /// Block for at most `timeout` waiting for the result.
    ///
    /// Returns `None` if the task did not finish in time; the future stays
    /// usable and can be waited on again. A timeout too large to represent as
    /// a deadline waits without limit.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            futures::executor::block_on(futures::future::poll_fn(|cx| self.poll_receiver(cx)));
            return self.result.take();
        };

        let waker = futures_task::waker(Arc::new(Unparker(thread::current())));
        let mut cx = Context::from_waker(&waker);
        while self.poll_receiver(&mut cx).is_pending() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::park_timeout(deadline - now);
        }
        self.result.take()
    }

    /// Move the channel outcome into `result` once it arrives.
    fn poll_receiver(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if let Some(receiver) = self.receiver.as_mut() {
            let outcome = ready!(Pin::new(receiver).poll(cx));
            // A canceled channel means the promise was dropped unfulfilled.
            self.result = Some(outcome.unwrap_or_else(|_| Err(JobError::Abandoned)));
            self.receiver = None;
        }
        Poll::Ready(())
    }
}

impl<T> Future for JobFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        ready!(this.poll_receiver(cx));
        Poll::Ready(
            this.result
                .take()
                .unwrap_or_else(|| Err(JobError::other("JobFuture result already taken"))),
        )
    }
}

impl<T> std::fmt::Debug for JobFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match (&self.receiver, &self.result) {
            (Some(_), _) => "pending",
            (None, Some(_)) => "ready",
            (None, None) => "taken",
        };
        f.debug_struct("JobFuture").field("state", &state).finish()
    }
}

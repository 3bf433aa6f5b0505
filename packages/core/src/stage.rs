//! Single-resolution async results.
//!
//! Every facade operation returns an [`AsyncStage`], whether the answer was
//! already in memory (a cache hit, a cache miss) or needs a round trip to the
//! remote store. Callers treat both the same way: `.await` it, or
//! [`AsyncStage::resolve`] it to look at the outcome without taking it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Error, Result};

/// Boxed future driving a pending stage.
pub type StageFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

static CONSUMED: Error = Error::Consumed;

enum State<T> {
    /// Outcome known.
    Ready(Result<T>),
    /// Bound to an operation that has not completed yet.
    Pending(StageFuture<T>),
    /// Outcome moved out by awaiting the stage.
    Taken,
}

/// A single-resolution handle for a value or a failure.
///
/// A stage is either created already resolved ([`AsyncStage::completed`],
/// [`AsyncStage::failed`]) or bound to a pending operation
/// ([`AsyncStage::pending`]). A pending stage's future is driven by its
/// owner; dropping or cancelling the stage drops the operation, so a write
/// that is never awaited never happens.
///
/// # Example
///
/// ```rust
/// use treecache_core::AsyncStage;
///
/// let mut stage = AsyncStage::completed(7);
/// assert!(stage.is_done());
/// assert_eq!(stage.peek().unwrap().unwrap(), &7);
/// ```
#[must_use = "pending stages do nothing unless awaited or resolved"]
pub struct AsyncStage<T> {
    state: State<T>,
}

// The outcome is never pinned in place; only the boxed future is polled.
impl<T> Unpin for AsyncStage<T> {}

impl<T> AsyncStage<T> {
    /// A stage already resolved with `value`.
    pub fn completed(value: T) -> Self {
        Self {
            state: State::Ready(Ok(value)),
        }
    }

    /// A stage already resolved with `error`.
    pub fn failed(error: Error) -> Self {
        Self {
            state: State::Ready(Err(error)),
        }
    }

    /// A stage already resolved with `outcome`.
    pub fn from_result(outcome: Result<T>) -> Self {
        Self {
            state: State::Ready(outcome),
        }
    }

    /// A stage that resolves when `future` completes.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            state: State::Pending(Box::pin(future)),
        }
    }

    /// Whether the outcome is known (or has already been taken).
    pub fn is_done(&self) -> bool {
        !matches!(self.state, State::Pending(_))
    }

    /// The outcome, if it is already known. Never waits.
    pub fn peek(&self) -> Option<std::result::Result<&T, &Error>> {
        match &self.state {
            State::Ready(outcome) => Some(outcome.as_ref()),
            State::Pending(_) => None,
            State::Taken => Some(Err(&CONSUMED)),
        }
    }

    /// Wait for the outcome and keep it in the stage.
    ///
    /// Calling this again returns the same outcome without re-running
    /// anything.
    pub async fn resolve(&mut self) -> std::result::Result<&T, &Error> {
        if let State::Pending(future) = &mut self.state {
            let outcome = future.as_mut().await;
            self.state = State::Ready(outcome);
        }
        match &self.state {
            State::Ready(outcome) => outcome.as_ref(),
            State::Pending(_) | State::Taken => Err(&CONSUMED),
        }
    }

    /// Wait for the outcome; `Some` on success.
    pub async fn value(&mut self) -> Option<&T> {
        self.resolve().await.ok()
    }

    /// Wait for the outcome; `Some` on failure.
    pub async fn error(&mut self) -> Option<&Error> {
        self.resolve().await.err()
    }

    /// Best-effort cancellation.
    ///
    /// A pending stage drops its operation and resolves with
    /// [`Error::Cancelled`]; returns `false` if the stage was already done.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            State::Pending(_) => {
                self.state = State::Ready(Err(Error::Cancelled));
                true
            }
            State::Ready(_) | State::Taken => false,
        }
    }

    /// Transform the success value, preserving pre-resolved-ness.
    pub fn map<U, F>(self, f: F) -> AsyncStage<U>
    where
        T: 'static,
        U: 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self.state {
            State::Ready(outcome) => AsyncStage::from_result(outcome.map(f)),
            State::Pending(future) => AsyncStage::pending(async move { future.await.map(f) }),
            State::Taken => AsyncStage::failed(Error::Consumed),
        }
    }
}

impl<T> From<Result<T>> for AsyncStage<T> {
    fn from(outcome: Result<T>) -> Self {
        Self::from_result(outcome)
    }
}

impl<T> Future for AsyncStage<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Pending(future) => match future.as_mut().poll(cx) {
                Poll::Ready(outcome) => {
                    this.state = State::Taken;
                    Poll::Ready(outcome)
                }
                Poll::Pending => Poll::Pending,
            },
            State::Ready(_) => match std::mem::replace(&mut this.state, State::Taken) {
                State::Ready(outcome) => Poll::Ready(outcome),
                State::Pending(_) | State::Taken => Poll::Ready(Err(Error::Consumed)),
            },
            State::Taken => Poll::Ready(Err(Error::Consumed)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Ready(outcome) => f.debug_tuple("AsyncStage::Ready").field(outcome).finish(),
            State::Pending(_) => f.write_str("AsyncStage::Pending"),
            State::Taken => f.write_str("AsyncStage::Taken"),
        }
    }
}

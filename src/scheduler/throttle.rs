//! Cooperative throttling for the aggressive strategy.
//!
//! One [`ThrottleContext`] is shared by every group in a run's parallel
//! phase. A future wrapped with [`ThrottleContext::throttle`] must hold one
//! of the context's turn slots to be polled and gives the slot back whenever
//! it suspends, so at most `limit` continuations make progress at any
//! instant no matter how deep in the call graph they suspend. A suspended
//! future (timer, I/O wait) holds no slot.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Shared turn-taking state for one aggressive parallel phase.
pub struct ThrottleContext {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl ThrottleContext {
    /// Context allowing `limit` concurrently progressing continuations.
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Turn slots not currently held by a polling future.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Stop throttling: wrapped futures run unimpeded from here on.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Wrap a future so its every poll takes a turn slot.
    pub fn throttle<F>(&self, future: F) -> Throttled<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send,
    {
        Throttled {
            inner: Box::pin(future),
            slots: Arc::clone(&self.slots),
            turn: Turn::Idle,
        }
    }
}

impl fmt::Debug for ThrottleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleContext")
            .field("limit", &self.limit)
            .field("available", &self.available_slots())
            .finish()
    }
}

enum Turn {
    Idle,
    Waiting(BoxFuture<'static, Result<OwnedSemaphorePermit, AcquireError>>),
}

/// Future wrapper produced by [`ThrottleContext::throttle`].
pub struct Throttled<T> {
    inner: BoxFuture<'static, T>,
    slots: Arc<Semaphore>,
    turn: Turn,
}

impl<T> Future for Throttled<T> {
    type Output = T;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        loop {
            match &mut this.turn {
                Turn::Idle => {
                    this.turn = Turn::Waiting(Box::pin(Arc::clone(&this.slots).acquire_owned()));
                }
                Turn::Waiting(acquire) => {
                    let permit = match acquire.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Ok(permit)) => permit,
                        Poll::Ready(Err(_)) => {
                            // Context closed: run unthrottled rather than stall.
                            this.turn = Turn::Idle;
                            return this.inner.as_mut().poll(cx);
                        }
                    };

                    let polled = this.inner.as_mut().poll(cx);

                    // The turn ends with the poll, whatever it produced; a
                    // suspended continuation must not occupy a slot.
                    drop(permit);
                    this.turn = Turn::Idle;
                    return polled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, poll_fn};
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_ready_future_passes_straight_through() {
        let context = ThrottleContext::new(2);
        let mut wrapped = task::spawn(context.throttle(async { 7 }));
        assert_ready_eq!(wrapped.poll(), 7);
        assert_eq!(context.available_slots(), 2);
    }

    #[test]
    fn test_slot_held_exactly_during_poll() {
        let context = Arc::new(ThrottleContext::new(1));
        let observer = Arc::clone(&context);
        let inner = poll_fn(move |_| {
            assert_eq!(observer.available_slots(), 0);
            Poll::Ready(())
        });

        let mut wrapped = task::spawn(context.throttle(inner));
        assert_ready_eq!(wrapped.poll(), ());
        assert_eq!(context.available_slots(), 1);
    }

    #[test]
    fn test_suspending_future_returns_its_slot() {
        let context = ThrottleContext::new(1);
        let mut wrapped = task::spawn(context.throttle(pending::<()>()));
        assert_pending!(wrapped.poll());
        // The continuation is suspended, so the slot is free for others.
        assert_eq!(context.available_slots(), 1);
    }

    #[test]
    fn test_multiple_suspended_futures_share_one_slot() {
        let context = ThrottleContext::new(1);
        let mut first = task::spawn(context.throttle(pending::<()>()));
        let mut second = task::spawn(context.throttle(pending::<()>()));
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(context.available_slots(), 1);
    }

    #[test]
    fn test_closed_context_stops_throttling() {
        let context = ThrottleContext::new(1);
        context.close();
        let mut wrapped = task::spawn(context.throttle(async { "ran" }));
        assert_ready_eq!(wrapped.poll(), "ran");
    }

    #[tokio::test]
    async fn test_wrapped_future_completes_with_its_value() {
        let context = ThrottleContext::new(3);
        let value = context
            .throttle(async {
                tokio::task::yield_now().await;
                41 + 1
            })
            .await;
        assert_eq!(value, 42);
        assert_eq!(context.available_slots(), 3);
    }
}

//! Admission control for group bodies.

use super::throttle::ThrottleContext;
use crate::cancel::CancelSignal;
use crate::options::{ConcurrencyStrategy, ExecutionOptions};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission decision for one group body.
pub(crate) enum Admission {
    /// Proceed. Holds the gate slot, if any, until dropped.
    Granted(Option<OwnedSemaphorePermit>),
    /// The shared signal fired while waiting; the body never starts.
    Canceled,
}

/// Enforces the run's concurrency bound on group bodies.
#[derive(Clone)]
pub(crate) enum ConcurrencyLimiter {
    /// No bound.
    Unlimited,
    /// Conservative: a counting gate admits at most N bodies.
    Gate(Arc<Semaphore>),
    /// Aggressive: every body starts, a shared context throttles progress.
    Throttle(Arc<ThrottleContext>),
}

impl ConcurrencyLimiter {
    pub(crate) fn for_options(options: &ExecutionOptions) -> Self {
        let Some(bound) = options.concurrency_bound() else {
            return ConcurrencyLimiter::Unlimited;
        };
        match options.strategy() {
            ConcurrencyStrategy::Conservative => {
                debug!(bound, "admission gate enabled");
                ConcurrencyLimiter::Gate(Arc::new(Semaphore::new(bound)))
            }
            ConcurrencyStrategy::Aggressive => {
                debug!(bound, "aggressive throttle enabled");
                ConcurrencyLimiter::Throttle(Arc::new(ThrottleContext::new(bound)))
            }
        }
    }

    /// The shared throttle context, when the aggressive strategy is active.
    pub(crate) fn throttle_context(&self) -> Option<Arc<ThrottleContext>> {
        match self {
            ConcurrencyLimiter::Throttle(context) => Some(Arc::clone(context)),
            _ => None,
        }
    }

    /// Limiter for the sequential phase: the gate keeps counting, but the
    /// aggressive context belongs to the parallel phase and is dropped here.
    pub(crate) fn into_sequential(self) -> Self {
        match self {
            ConcurrencyLimiter::Throttle(_) => ConcurrencyLimiter::Unlimited,
            other => other,
        }
    }

    /// Wait for a body slot, observing cancellation while queued.
    pub(crate) async fn admit(&self, cancel: &CancelSignal) -> Admission {
        match self {
            // Throttling applies per poll, not at admission.
            ConcurrencyLimiter::Unlimited | ConcurrencyLimiter::Throttle(_) => {
                Admission::Granted(None)
            }
            ConcurrencyLimiter::Gate(gate) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Admission::Canceled,
                    permit = Arc::clone(gate).acquire_owned() => match permit {
                        Ok(permit) => Admission::Granted(Some(permit)),
                        // The gate is never closed; if it somehow is, run ungated.
                        Err(_) => Admission::Granted(None),
                    },
                }
            }
        }
    }
}

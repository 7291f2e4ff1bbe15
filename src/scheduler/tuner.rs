//! Worker-pool floor tuning for gated parallel runs.
//!
//! With an admission gate, admitted group bodies may briefly block a worker
//! each. Raising the pool's ready-thread floor up front avoids the lazy
//! thread ramp-up stalling the first admitted groups.

use crate::error::{Result, SchedulerError};
use std::sync::{Arc, Barrier};
use tokio::runtime::Handle;
use tracing::debug;

/// Never keep more than this many threads warm on the scheduler's account;
/// past it, the pool grows on demand.
pub(crate) const GATED_THREAD_FLOOR: usize = 4;

/// Capability handle onto the hosting runtime's worker pool.
///
/// The production impl is [`RuntimeWorkers`]; tests substitute stubs.
pub trait WorkerPool: Send + Sync {
    /// Number of threads the pool currently keeps ready.
    fn min_threads(&self) -> Result<usize>;

    /// Raise the ready-thread floor. Best effort once it returns `Ok`.
    fn set_min_threads(&self, floor: usize) -> Result<()>;
}

/// Worker pool of the ambient tokio runtime.
///
/// Both operations need a reachable runtime handle; calling them from
/// outside a runtime is the capability-missing case and fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeWorkers;

impl WorkerPool for RuntimeWorkers {
    fn min_threads(&self) -> Result<usize> {
        let handle = current_handle()?;
        Ok(handle.metrics().num_workers())
    }

    fn set_min_threads(&self, floor: usize) -> Result<()> {
        let handle = current_handle()?;

        // A rendezvous forces the blocking pool to actually hold `floor`
        // threads alive at once instead of reusing one lazily.
        let barrier = Arc::new(Barrier::new(floor));
        for _ in 0..floor {
            let barrier = Arc::clone(&barrier);
            handle.spawn_blocking(move || {
                barrier.wait();
            });
        }
        debug!(floor, "pre-warmed worker threads");
        Ok(())
    }
}

fn current_handle() -> Result<Handle> {
    Handle::try_current().map_err(|e| {
        SchedulerError::RuntimeTuning(format!("no runtime available for worker tuning: {e}"))
    })
}

/// Raise the pool floor to `min(GATED_THREAD_FLOOR, max_concurrent)` if it
/// is below that. Called once per gated run, before any group is admitted.
pub(crate) fn ensure_thread_floor(pool: &dyn WorkerPool, max_concurrent: usize) -> Result<()> {
    let floor = GATED_THREAD_FLOOR.min(max_concurrent);
    let current = pool.min_threads()?;
    if current < floor {
        debug!(current, floor, "raising worker-pool floor");
        pool.set_min_threads(floor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubPool {
        min: usize,
        fail_read: bool,
        raised_to: Mutex<Vec<usize>>,
    }

    impl StubPool {
        fn with_min(min: usize) -> Self {
            Self {
                min,
                fail_read: false,
                raised_to: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                min: 0,
                fail_read: true,
                raised_to: Mutex::new(Vec::new()),
            }
        }
    }

    impl WorkerPool for StubPool {
        fn min_threads(&self) -> Result<usize> {
            if self.fail_read {
                return Err(SchedulerError::RuntimeTuning("stub refused".to_string()));
            }
            Ok(self.min)
        }

        fn set_min_threads(&self, floor: usize) -> Result<()> {
            self.raised_to.lock().unwrap().push(floor);
            Ok(())
        }
    }

    #[test]
    fn test_floor_raised_when_below_target() {
        let pool = StubPool::with_min(1);
        ensure_thread_floor(&pool, 8).unwrap();
        assert_eq!(*pool.raised_to.lock().unwrap(), vec![4]);
    }

    #[test]
    fn test_floor_capped_by_concurrency_limit() {
        let pool = StubPool::with_min(0);
        ensure_thread_floor(&pool, 2).unwrap();
        assert_eq!(*pool.raised_to.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_sufficient_floor_left_alone() {
        let pool = StubPool::with_min(4);
        ensure_thread_floor(&pool, 8).unwrap();
        assert!(pool.raised_to.lock().unwrap().is_empty());

        let pool = StubPool::with_min(6);
        ensure_thread_floor(&pool, 2).unwrap();
        assert!(pool.raised_to.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_pool_is_fatal() {
        let pool = StubPool::failing();
        let err = ensure_thread_floor(&pool, 8).unwrap_err();
        assert!(matches!(err, SchedulerError::RuntimeTuning(_)));
    }

    #[test]
    fn test_runtime_workers_outside_runtime_fails() {
        // Plain #[test]: no tokio runtime on this thread.
        let err = RuntimeWorkers.min_threads().unwrap_err();
        assert!(matches!(err, SchedulerError::RuntimeTuning(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runtime_workers_reads_worker_count() {
        let workers = RuntimeWorkers.min_threads().unwrap();
        assert_eq!(workers, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runtime_workers_prewarm_completes() {
        RuntimeWorkers.set_min_threads(3).unwrap();
    }
}

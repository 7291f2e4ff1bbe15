//! Group scheduling: policy resolution, partitioning, and the two-phase
//! parallel/sequential run.

mod limiter;
pub mod throttle;
pub mod tuner;

pub use tuner::{RuntimeWorkers, WorkerPool};

use crate::cancel::CancelSignal;
use crate::diagnostics::{panic_message, DiagnosticSink, TracingSink};
use crate::error::Result;
use crate::options::{ConcurrencyStrategy, ExecutionOptions, GroupSetDefaults, RunnerOverrides};
use crate::ordering::loader::{load_orderers, LoadedOrderers};
use crate::ordering::{
    apply_group_order, apply_item_order, GroupOrderer, ItemOrderer, OrdererRegistry,
};
use crate::summary::RunSummary;
use crate::work::{ItemOutcome, WorkGroup};
use futures::FutureExt;
use limiter::{Admission, ConcurrencyLimiter};
use once_cell::sync::OnceCell;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument};
use tuner::ensure_thread_floor;
use uuid::Uuid;

/// How one group's execution concluded.
#[derive(Debug, PartialEq, Eq)]
pub enum GroupOutcome {
    /// The group ran, possibly stopping early at a cancellation check; the
    /// summary covers whatever did execute.
    Completed(RunSummary),
    /// Cancellation arrived before the group ran anything.
    Canceled,
    /// The group's task died instead of reporting; nothing is counted.
    Faulted(String),
}

struct InitState {
    options: ExecutionOptions,
    group_orderer: Arc<dyn GroupOrderer>,
    item_orderer: Arc<dyn ItemOrderer>,
    degraded: bool,
}

/// Schedules a set of work groups under a resolved execution policy.
///
/// One scheduler runs once. Configuration happens through the builder
/// methods before the first call to [`describe_environment`] or [`run`];
/// whichever comes first pins the policy and resolves the configured
/// ordering extensions, and later calls see that same state.
///
/// [`describe_environment`]: GroupScheduler::describe_environment
/// [`run`]: GroupScheduler::run
pub struct GroupScheduler {
    groups: Vec<WorkGroup>,
    defaults: GroupSetDefaults,
    overrides: RunnerOverrides,
    registry: Arc<OrdererRegistry>,
    diagnostics: Arc<dyn DiagnosticSink>,
    pool: Arc<dyn WorkerPool>,
    cancel: CancelSignal,
    init: OnceCell<InitState>,
}

impl GroupScheduler {
    pub fn new(groups: Vec<WorkGroup>, defaults: GroupSetDefaults) -> Self {
        Self {
            groups,
            defaults,
            overrides: RunnerOverrides::default(),
            registry: Arc::new(OrdererRegistry::new()),
            diagnostics: Arc::new(TracingSink),
            pool: Arc::new(RuntimeWorkers),
            cancel: CancelSignal::new(),
            init: OnceCell::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: RunnerOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_registry(mut self, registry: Arc<OrdererRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The signal this run observes.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// The resolved policy. Pins initialization on first use.
    pub fn options(&self) -> &ExecutionOptions {
        &self.init_state().options
    }

    /// One-line description of the active policy, e.g. `parallel (4 threads)`
    /// or `non-parallel`. Pins initialization on first use.
    pub fn describe_environment(&self) -> String {
        self.init_state().options.describe()
    }

    fn init_state(&self) -> &InitState {
        self.init.get_or_init(|| {
            let options = ExecutionOptions::resolve(&self.defaults, &self.overrides);
            let LoadedOrderers {
                group,
                item,
                degraded,
            } = load_orderers(
                &self.registry,
                options.group_orderer(),
                options.item_orderer(),
                self.diagnostics.as_ref(),
            );
            debug!(?options, degraded, "execution options resolved");
            InitState {
                options,
                group_orderer: group,
                item_orderer: item,
                degraded,
            }
        })
    }

    /// Execute every group and fold their outcomes into one summary.
    pub async fn run(self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<RunSummary> {
        let (options, group_orderer, item_orderer, degraded) = {
            let state = self.init_state();
            (
                state.options.clone(),
                Arc::clone(&state.group_orderer),
                Arc::clone(&state.item_orderer),
                state.degraded,
            )
        };

        let groups = if degraded {
            warn!(
                discarded = self.groups.len(),
                "ordering extension failed to load, running no groups"
            );
            Vec::new()
        } else {
            std::mem::take(&mut self.groups)
        };

        let groups = apply_group_order(group_orderer.as_ref(), groups, self.diagnostics.as_ref());
        info!(
            groups = groups.len(),
            environment = %options.describe(),
            "scheduling work groups"
        );

        if options.parallelism_disabled() {
            return Ok(self.run_serial(groups, item_orderer).await);
        }
        self.run_parallel(groups, &options, item_orderer).await
    }

    async fn run_serial(
        &self,
        groups: Vec<WorkGroup>,
        item_orderer: Arc<dyn ItemOrderer>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for group in groups {
            let name = group.name().to_string();
            let outcome = run_group(
                group,
                Arc::clone(&item_orderer),
                Arc::clone(&self.diagnostics),
                self.cancel.clone(),
            )
            .await;
            merge_outcome(&mut summary, &name, outcome);
            if self.cancel.is_cancelled() {
                debug!("cancellation requested, stopping serial run");
                break;
            }
        }
        summary
    }

    async fn run_parallel(
        &self,
        groups: Vec<WorkGroup>,
        options: &ExecutionOptions,
        item_orderer: Arc<dyn ItemOrderer>,
    ) -> Result<RunSummary> {
        if options.strategy() == ConcurrencyStrategy::Conservative {
            if let Some(bound) = options.concurrency_bound() {
                ensure_thread_floor(self.pool.as_ref(), bound)?;
            }
        }
        let limiter = ConcurrencyLimiter::for_options(options);

        let mut parallel = Vec::new();
        let mut sequential = Vec::new();
        for group in groups {
            if group.is_sequential_only() {
                sequential.push(group);
            } else {
                parallel.push(group);
            }
        }
        debug!(
            parallel = parallel.len(),
            sequential = sequential.len(),
            "partitioned work groups"
        );

        // Launch the whole parallel phase before awaiting any of it.
        let mut handles = Vec::with_capacity(parallel.len());
        for group in parallel {
            let name = group.name().to_string();
            let handle = self.spawn_group(group, &limiter, &item_orderer);
            handles.push((name, handle));
        }

        let mut summary = RunSummary::default();
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_cancelled() => GroupOutcome::Canceled,
                Err(join_error) => GroupOutcome::Faulted(join_error.to_string()),
            };
            merge_outcome(&mut summary, &name, outcome);
        }

        // The admission gate carries over; the aggressive throttle belongs
        // to the parallel phase and ends with it.
        let limiter = limiter.into_sequential();
        for group in sequential {
            let name = group.name().to_string();
            let outcome = match limiter.admit(&self.cancel).await {
                Admission::Granted(permit) => {
                    let outcome = run_group(
                        group,
                        Arc::clone(&item_orderer),
                        Arc::clone(&self.diagnostics),
                        self.cancel.clone(),
                    )
                    .await;
                    drop(permit);
                    outcome
                }
                Admission::Canceled => GroupOutcome::Canceled,
            };
            merge_outcome(&mut summary, &name, outcome);
            if self.cancel.is_cancelled() {
                debug!("cancellation requested, skipping remaining sequential groups");
                break;
            }
        }

        Ok(summary)
    }

    fn spawn_group(
        &self,
        group: WorkGroup,
        limiter: &ConcurrencyLimiter,
        item_orderer: &Arc<dyn ItemOrderer>,
    ) -> JoinHandle<GroupOutcome> {
        let limiter = limiter.clone();
        let throttle = limiter.throttle_context();
        let item_orderer = Arc::clone(item_orderer);
        let diagnostics = Arc::clone(&self.diagnostics);
        let cancel = self.cancel.clone();
        let span = debug_span!("group", name = %group.name());

        let body = async move {
            match limiter.admit(&cancel).await {
                Admission::Canceled => GroupOutcome::Canceled,
                Admission::Granted(permit) => {
                    let outcome = run_group(group, item_orderer, diagnostics, cancel).await;
                    drop(permit);
                    outcome
                }
            }
        }
        .instrument(span);

        match throttle {
            Some(context) => tokio::spawn(context.throttle(body)),
            None => tokio::spawn(body),
        }
    }
}

/// Run one group's items in order, folding their outcomes.
///
/// Item panics are contained and counted as failures. Cancellation is
/// checked between items only; a running item is never interrupted.
async fn run_group(
    group: WorkGroup,
    item_orderer: Arc<dyn ItemOrderer>,
    diagnostics: Arc<dyn DiagnosticSink>,
    cancel: CancelSignal,
) -> GroupOutcome {
    let items = apply_item_order(
        item_orderer.as_ref(),
        group.name(),
        group.items().to_vec(),
        diagnostics.as_ref(),
    );

    let mut summary = RunSummary::default();
    let mut started = false;
    for item in items {
        if cancel.is_cancelled() {
            if !started {
                return GroupOutcome::Canceled;
            }
            debug!(group = group.name(), "cancellation requested mid-group");
            return GroupOutcome::Completed(summary);
        }
        started = true;

        let caught = AssertUnwindSafe(item.execute(&cancel)).catch_unwind().await;
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(payload) => ItemOutcome::Failed(format!(
                "work item panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        summary.total += 1;
        match outcome {
            ItemOutcome::Passed => {}
            ItemOutcome::Failed(reason) => {
                summary.failed += 1;
                warn!(group = group.name(), item = item.name(), %reason, "work item failed");
            }
            ItemOutcome::Skipped(reason) => {
                summary.skipped += 1;
                debug!(group = group.name(), item = item.name(), %reason, "work item skipped");
            }
        }
    }
    GroupOutcome::Completed(summary)
}

fn merge_outcome(summary: &mut RunSummary, group_name: &str, outcome: GroupOutcome) {
    match outcome {
        GroupOutcome::Completed(part) => summary.merge(part),
        GroupOutcome::Canceled => {
            debug!(group = group_name, "group canceled, contributing nothing")
        }
        GroupOutcome::Faulted(reason) => {
            error!(group = group_name, %reason, "group task faulted, contributing nothing")
        }
    }
}

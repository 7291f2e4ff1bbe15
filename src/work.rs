//! Work items and work groups.
//!
//! The scheduler treats items as opaque: it decides when each group runs
//! and with how much company, while the item decides what running means.

use crate::cancel::CancelSignal;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Terminal state of one executed work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ItemOutcome::Skipped(_))
    }
}

/// A single unit of executable work.
///
/// `execute` runs to completion even when the shared signal fires mid-item;
/// items may consult the signal to cut their own work short.
#[async_trait]
pub trait WorkItem: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, cancel: &CancelSignal) -> ItemOutcome;
}

/// Adapter turning an async closure into a [`WorkItem`].
///
/// Mostly useful to embedders and tests; plan-driven runs use
/// [`ShellWorkItem`](crate::plan::ShellWorkItem) instead.
pub struct FnWorkItem {
    name: String,
    run: Box<dyn Fn(CancelSignal) -> BoxFuture<'static, ItemOutcome> + Send + Sync>,
}

impl FnWorkItem {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(CancelSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ItemOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move |cancel| Box::pin(run(cancel))),
        }
    }

    /// Item that completes immediately with [`ItemOutcome::Passed`].
    pub fn passing(name: impl Into<String>) -> Self {
        Self::new(name, |_| async { ItemOutcome::Passed })
    }
}

#[async_trait]
impl WorkItem for FnWorkItem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, cancel: &CancelSignal) -> ItemOutcome {
        (self.run)(cancel.clone()).await
    }
}

impl fmt::Debug for FnWorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorkItem").field("name", &self.name).finish()
    }
}

/// An ordered set of work items scheduled as one unit.
///
/// Items within a group always run one at a time, in order. Groups marked
/// `sequential_only` are additionally excluded from the parallel phase.
#[derive(Clone)]
pub struct WorkGroup {
    name: String,
    items: Vec<Arc<dyn WorkItem>>,
    sequential_only: bool,
}

impl WorkGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            sequential_only: false,
        }
    }

    pub fn with_items(name: impl Into<String>, items: Vec<Arc<dyn WorkItem>>) -> Self {
        Self {
            name: name.into(),
            items,
            sequential_only: false,
        }
    }

    /// Mark whether this group must stay out of the parallel phase.
    pub fn sequential_only(mut self, sequential_only: bool) -> Self {
        self.sequential_only = sequential_only;
        self
    }

    pub fn push(&mut self, item: Arc<dyn WorkItem>) {
        self.items.push(item);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Arc<dyn WorkItem>] {
        &self.items
    }

    pub fn is_sequential_only(&self) -> bool {
        self.sequential_only
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Debug for WorkGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGroup")
            .field("name", &self.name)
            .field("items", &self.items.len())
            .field("sequential_only", &self.sequential_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_work_item_runs_closure() {
        let item = FnWorkItem::new("flaky", |_| async {
            ItemOutcome::Failed("connection refused".to_string())
        });
        let outcome = item.execute(&CancelSignal::new()).await;
        assert!(outcome.is_failure());
        assert_eq!(item.name(), "flaky");
    }

    #[tokio::test]
    async fn test_fn_work_item_sees_cancel_signal() {
        let item = FnWorkItem::new("observer", |cancel: CancelSignal| async move {
            if cancel.is_cancelled() {
                ItemOutcome::Skipped("cancelled".to_string())
            } else {
                ItemOutcome::Passed
            }
        });

        let signal = CancelSignal::new();
        assert_eq!(item.execute(&signal).await, ItemOutcome::Passed);
        signal.cancel();
        assert!(item.execute(&signal).await.is_skip());
    }

    #[test]
    fn test_group_builder() {
        let mut group = WorkGroup::new("db").sequential_only(true);
        assert!(group.is_sequential_only());
        assert!(group.is_empty());

        group.push(Arc::new(FnWorkItem::passing("migrate")));
        group.push(Arc::new(FnWorkItem::passing("seed")));
        assert_eq!(group.len(), 2);
        assert_eq!(group.items()[0].name(), "migrate");
    }

    #[test]
    fn test_group_clone_shares_items() {
        let group = WorkGroup::with_items(
            "api",
            vec![Arc::new(FnWorkItem::passing("ping")) as Arc<dyn WorkItem>],
        );
        let cloned = group.clone();
        assert_eq!(cloned.name(), "api");
        assert!(Arc::ptr_eq(&group.items()[0], &cloned.items()[0]));
    }
}

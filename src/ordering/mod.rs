//! Pluggable ordering of groups and items.
//!
//! Runs can name ordering extensions by [`TypeRef`]; the loader resolves
//! them through an [`OrdererRegistry`] before anything executes. A handful
//! of built-in orderers ship under the `builtin` source.

pub mod loader;
pub mod registry;

pub use loader::OrdererResolution;
pub use registry::OrdererRegistry;

use crate::diagnostics::{panic_message, Diagnostic, DiagnosticSink};
use crate::work::{WorkGroup, WorkItem};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Source name the built-in orderers are registered under.
pub const BUILTIN_SOURCE: &str = "builtin";

/// Names an ordering extension: a type and the source it should come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub type_name: String,
    pub source: String,
}

impl TypeRef {
    pub fn new(type_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// Reference to a built-in orderer by name.
    pub fn builtin(type_name: impl Into<String>) -> Self {
        Self::new(type_name, BUILTIN_SOURCE)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in '{}'", self.type_name, self.source)
    }
}

/// Reorders whole groups before partitioning.
pub trait GroupOrderer: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self, groups: Vec<WorkGroup>) -> Vec<WorkGroup>;
}

/// Reorders the items of one group before it runs.
pub trait ItemOrderer: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self, items: Vec<Arc<dyn WorkItem>>) -> Vec<Arc<dyn WorkItem>>;
}

/// Identity ordering: everything stays in discovery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryOrder;

impl GroupOrderer for DiscoveryOrder {
    fn name(&self) -> &str {
        "discovery"
    }

    fn order(&self, groups: Vec<WorkGroup>) -> Vec<WorkGroup> {
        groups
    }
}

impl ItemOrderer for DiscoveryOrder {
    fn name(&self) -> &str {
        "discovery"
    }

    fn order(&self, items: Vec<Arc<dyn WorkItem>>) -> Vec<Arc<dyn WorkItem>> {
        items
    }
}

/// Sorts by name, ascending.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphabeticalOrder;

impl GroupOrderer for AlphabeticalOrder {
    fn name(&self) -> &str {
        "alphabetical"
    }

    fn order(&self, mut groups: Vec<WorkGroup>) -> Vec<WorkGroup> {
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }
}

impl ItemOrderer for AlphabeticalOrder {
    fn name(&self) -> &str {
        "alphabetical"
    }

    fn order(&self, mut items: Vec<Arc<dyn WorkItem>>) -> Vec<Arc<dyn WorkItem>> {
        items.sort_by(|a, b| a.name().cmp(b.name()));
        items
    }
}

/// Reverses discovery order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseOrder;

impl GroupOrderer for ReverseOrder {
    fn name(&self) -> &str {
        "reverse"
    }

    fn order(&self, mut groups: Vec<WorkGroup>) -> Vec<WorkGroup> {
        groups.reverse();
        groups
    }
}

impl ItemOrderer for ReverseOrder {
    fn name(&self) -> &str {
        "reverse"
    }

    fn order(&self, mut items: Vec<Arc<dyn WorkItem>>) -> Vec<Arc<dyn WorkItem>> {
        items.reverse();
        items
    }
}

/// Shuffles with the thread-local RNG. Useful for flushing out order
/// dependencies between groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShuffleOrder;

impl GroupOrderer for ShuffleOrder {
    fn name(&self) -> &str {
        "shuffle"
    }

    fn order(&self, mut groups: Vec<WorkGroup>) -> Vec<WorkGroup> {
        groups.shuffle(&mut rand::rng());
        groups
    }
}

impl ItemOrderer for ShuffleOrder {
    fn name(&self) -> &str {
        "shuffle"
    }

    fn order(&self, mut items: Vec<Arc<dyn WorkItem>>) -> Vec<Arc<dyn WorkItem>> {
        items.shuffle(&mut rand::rng());
        items
    }
}

/// Registry with the built-in orderers pre-registered under
/// [`BUILTIN_SOURCE`], for both groups and items.
pub fn builtin_registry() -> OrdererRegistry {
    let mut registry = OrdererRegistry::new();
    registry.register_group_orderer(BUILTIN_SOURCE, "alphabetical", || {
        Ok(Arc::new(AlphabeticalOrder))
    });
    registry.register_group_orderer(BUILTIN_SOURCE, "reverse", || Ok(Arc::new(ReverseOrder)));
    registry.register_group_orderer(BUILTIN_SOURCE, "shuffle", || Ok(Arc::new(ShuffleOrder)));
    registry.register_item_orderer(BUILTIN_SOURCE, "alphabetical", || {
        Ok(Arc::new(AlphabeticalOrder))
    });
    registry.register_item_orderer(BUILTIN_SOURCE, "reverse", || Ok(Arc::new(ReverseOrder)));
    registry.register_item_orderer(BUILTIN_SOURCE, "shuffle", || Ok(Arc::new(ShuffleOrder)));
    registry
}

/// Apply a group orderer, keeping the input order if the orderer panics.
pub(crate) fn apply_group_order(
    orderer: &dyn GroupOrderer,
    groups: Vec<WorkGroup>,
    sink: &dyn DiagnosticSink,
) -> Vec<WorkGroup> {
    let before = groups.len();
    match catch_unwind(AssertUnwindSafe(|| orderer.order(groups.clone()))) {
        Ok(ordered) => {
            if ordered.len() != before {
                sink.report(Diagnostic::warning(format!(
                    "group orderer '{}' returned {} groups for {} inputs",
                    orderer.name(),
                    ordered.len(),
                    before
                )));
            }
            ordered
        }
        Err(payload) => {
            sink.report(Diagnostic::warning(format!(
                "group orderer '{}' panicked while ordering, keeping discovery order: {}",
                orderer.name(),
                panic_message(payload.as_ref())
            )));
            groups
        }
    }
}

/// Apply an item orderer, keeping the input order if the orderer panics.
pub(crate) fn apply_item_order(
    orderer: &dyn ItemOrderer,
    group_name: &str,
    items: Vec<Arc<dyn WorkItem>>,
    sink: &dyn DiagnosticSink,
) -> Vec<Arc<dyn WorkItem>> {
    let before = items.len();
    match catch_unwind(AssertUnwindSafe(|| orderer.order(items.clone()))) {
        Ok(ordered) => {
            if ordered.len() != before {
                sink.report(Diagnostic::warning(format!(
                    "item orderer '{}' returned {} items for {} inputs in group '{}'",
                    orderer.name(),
                    ordered.len(),
                    before,
                    group_name
                )));
            }
            ordered
        }
        Err(payload) => {
            sink.report(Diagnostic::warning(format!(
                "item orderer '{}' panicked while ordering group '{}', keeping discovery order: {}",
                orderer.name(),
                group_name,
                panic_message(payload.as_ref())
            )));
            items
        }
    }
}

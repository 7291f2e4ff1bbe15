//! Resolution of configured ordering extensions.
//!
//! Loading happens once, before any work runs. A missing, erroring, or
//! panicking extension never takes the process down: the failure becomes a
//! [`Diagnostic`] and the run degrades to executing nothing, on the grounds
//! that running work in an order the configuration explicitly rejected is
//! worse than running none of it.

use super::registry::OrdererRegistry;
use super::{DiscoveryOrder, GroupOrderer, ItemOrderer, TypeRef};
use crate::diagnostics::{panic_message, Diagnostic, DiagnosticSink};
use std::backtrace::BacktraceStatus;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Outcome of resolving one configured extension.
#[derive(Debug)]
pub enum OrdererResolution<T> {
    /// Nothing configured; the discovery order stands.
    Default,
    /// The extension resolved and constructed.
    Loaded(T),
    /// Resolution or construction failed.
    Failed(Diagnostic),
}

impl<T> OrdererResolution<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, OrdererResolution::Failed(_))
    }
}

/// Orderers the scheduler will actually use, plus whether loading degraded
/// the run.
pub(crate) struct LoadedOrderers {
    pub group: Arc<dyn GroupOrderer>,
    pub item: Arc<dyn ItemOrderer>,
    pub degraded: bool,
}

/// Resolve both configured orderers, reporting each failure independently.
pub(crate) fn load_orderers(
    registry: &OrdererRegistry,
    group_reference: Option<&TypeRef>,
    item_reference: Option<&TypeRef>,
    sink: &dyn DiagnosticSink,
) -> LoadedOrderers {
    let mut degraded = false;

    let item = match resolve_item_orderer(registry, item_reference) {
        OrdererResolution::Default => Arc::new(DiscoveryOrder) as Arc<dyn ItemOrderer>,
        OrdererResolution::Loaded(orderer) => {
            debug!(orderer = orderer.name(), "item orderer loaded");
            orderer
        }
        OrdererResolution::Failed(diagnostic) => {
            sink.report(diagnostic);
            degraded = true;
            Arc::new(DiscoveryOrder)
        }
    };

    let group = match resolve_group_orderer(registry, group_reference) {
        OrdererResolution::Default => Arc::new(DiscoveryOrder) as Arc<dyn GroupOrderer>,
        OrdererResolution::Loaded(orderer) => {
            debug!(orderer = orderer.name(), "group orderer loaded");
            orderer
        }
        OrdererResolution::Failed(diagnostic) => {
            sink.report(diagnostic);
            degraded = true;
            Arc::new(DiscoveryOrder)
        }
    };

    LoadedOrderers {
        group,
        item,
        degraded,
    }
}

/// Resolve a configured group orderer without reporting anything.
pub fn resolve_group_orderer(
    registry: &OrdererRegistry,
    reference: Option<&TypeRef>,
) -> OrdererResolution<Arc<dyn GroupOrderer>> {
    let Some(reference) = reference else {
        return OrdererResolution::Default;
    };
    let Some(factory) = registry.group_factory(reference) else {
        return OrdererResolution::Failed(not_found("group", reference));
    };
    match catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(orderer)) => OrdererResolution::Loaded(orderer),
        Ok(Err(error)) => {
            OrdererResolution::Failed(construction_error("group", reference, &error))
        }
        Err(payload) => OrdererResolution::Failed(construction_panic(
            "group",
            reference,
            &panic_message(payload.as_ref()),
        )),
    }
}

/// Resolve a configured item orderer without reporting anything.
pub fn resolve_item_orderer(
    registry: &OrdererRegistry,
    reference: Option<&TypeRef>,
) -> OrdererResolution<Arc<dyn ItemOrderer>> {
    let Some(reference) = reference else {
        return OrdererResolution::Default;
    };
    let Some(factory) = registry.item_factory(reference) else {
        return OrdererResolution::Failed(not_found("item", reference));
    };
    match catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(orderer)) => OrdererResolution::Loaded(orderer),
        Ok(Err(error)) => OrdererResolution::Failed(construction_error("item", reference, &error)),
        Err(payload) => OrdererResolution::Failed(construction_panic(
            "item",
            reference,
            &panic_message(payload.as_ref()),
        )),
    }
}

fn not_found(kind: &str, reference: &TypeRef) -> Diagnostic {
    Diagnostic::error(format!(
        "could not find type '{}' in '{}' for the configured {kind} orderer",
        reference.type_name, reference.source
    ))
    .with_source_location(reference.source.clone())
}

fn construction_error(kind: &str, reference: &TypeRef, error: &anyhow::Error) -> Diagnostic {
    let mut diagnostic = Diagnostic::error(format!(
        "{kind} orderer '{}' failed during construction: {error:#}",
        reference.type_name
    ))
    .with_source_location(reference.source.clone());

    let backtrace = error.backtrace();
    if matches!(backtrace.status(), BacktraceStatus::Captured) {
        diagnostic = diagnostic.with_backtrace(backtrace.to_string());
    }
    diagnostic
}

fn construction_panic(kind: &str, reference: &TypeRef, message: &str) -> Diagnostic {
    Diagnostic::error(format!(
        "{kind} orderer '{}' panicked during construction: {message}",
        reference.type_name
    ))
    .with_source_location(reference.source.clone())
}

//! Registry of ordering-extension factories.

use super::{GroupOrderer, ItemOrderer, TypeRef};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type GroupFactory = Box<dyn Fn() -> Result<Arc<dyn GroupOrderer>> + Send + Sync>;
type ItemFactory = Box<dyn Fn() -> Result<Arc<dyn ItemOrderer>> + Send + Sync>;

/// Maps `(source, type name)` pairs to orderer factories.
///
/// Factories run at load time, once per run, inside panic containment;
/// a factory that errors or panics degrades the run instead of crashing it.
#[derive(Default)]
pub struct OrdererRegistry {
    group_factories: HashMap<(String, String), GroupFactory>,
    item_factories: HashMap<(String, String), ItemFactory>,
}

impl OrdererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group-orderer factory. Re-registering a pair replaces it.
    pub fn register_group_orderer<F>(
        &mut self,
        source: impl Into<String>,
        type_name: impl Into<String>,
        factory: F,
    ) where
        F: Fn() -> Result<Arc<dyn GroupOrderer>> + Send + Sync + 'static,
    {
        self.group_factories
            .insert((source.into(), type_name.into()), Box::new(factory));
    }

    /// Register an item-orderer factory. Re-registering a pair replaces it.
    pub fn register_item_orderer<F>(
        &mut self,
        source: impl Into<String>,
        type_name: impl Into<String>,
        factory: F,
    ) where
        F: Fn() -> Result<Arc<dyn ItemOrderer>> + Send + Sync + 'static,
    {
        self.item_factories
            .insert((source.into(), type_name.into()), Box::new(factory));
    }

    pub(crate) fn group_factory(&self, reference: &TypeRef) -> Option<&GroupFactory> {
        self.group_factories
            .get(&(reference.source.clone(), reference.type_name.clone()))
    }

    pub(crate) fn item_factory(&self, reference: &TypeRef) -> Option<&ItemFactory> {
        self.item_factories
            .get(&(reference.source.clone(), reference.type_name.clone()))
    }

    pub fn contains_group_orderer(&self, reference: &TypeRef) -> bool {
        self.group_factory(reference).is_some()
    }

    pub fn contains_item_orderer(&self, reference: &TypeRef) -> bool {
        self.item_factory(reference).is_some()
    }
}

impl fmt::Debug for OrdererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrdererRegistry")
            .field("group_factories", &self.group_factories.len())
            .field("item_factories", &self.item_factories.len())
            .finish()
    }
}

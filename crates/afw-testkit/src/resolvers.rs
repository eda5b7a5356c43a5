use std::sync::{Arc, PoisonError, RwLock};

use afw_operation::{OperationKey, OperationResolver, ResolverProvider, UndoMapping, UndoMappingProvider};

/// Resolver list that tests can mutate while an invoker holds a clone.
#[derive(Clone, Default)]
pub struct ResolverSet {
    resolvers: Arc<RwLock<Vec<OperationResolver>>>,
}

impl ResolverSet {
    pub fn new(resolvers: impl IntoIterator<Item = OperationResolver>) -> Self {
        Self {
            resolvers: Arc::new(RwLock::new(resolvers.into_iter().collect())),
        }
    }

    pub fn push(&self, resolver: OperationResolver) {
        self.resolvers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resolver);
    }

    /// Removes every resolver registered for `key`.
    pub fn remove(&self, key: &OperationKey) {
        self.resolvers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|resolver| resolver.key() != key);
    }

    pub fn len(&self) -> usize {
        self.resolvers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResolverProvider for ResolverSet {
    fn operation_resolvers(&self) -> Vec<OperationResolver> {
        self.resolvers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Mutable undo mapping list.
#[derive(Clone, Default)]
pub struct MappingSet {
    mappings: Arc<RwLock<Vec<UndoMapping>>>,
}

impl MappingSet {
    pub fn new(mappings: impl IntoIterator<Item = UndoMapping>) -> Self {
        Self {
            mappings: Arc::new(RwLock::new(mappings.into_iter().collect())),
        }
    }

    pub fn push(&self, mapping: UndoMapping) {
        self.mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mapping);
    }

    pub fn remove(&self, key: &OperationKey) {
        self.mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|mapping| mapping.operation().key() != key);
    }
}

impl UndoMappingProvider for MappingSet {
    fn undo_mappings(&self) -> Vec<UndoMapping> {
        self.mappings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

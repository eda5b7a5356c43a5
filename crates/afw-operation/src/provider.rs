//! Interfaces the plugin system implements to feed the invoker.
//!
//! Lists are read fresh on every call; implementations must not assume the
//! invoker caches anything between invocations.

use async_trait::async_trait;

use crate::{ContextId, OperationResolver, ServiceKey, Services, UndoMapping};

/// Supplies the current resolver registrations, in registration order.
pub trait ResolverProvider: Send + Sync {
    fn operation_resolvers(&self) -> Vec<OperationResolver>;
}

impl<F> ResolverProvider for F
where
    F: Fn() -> Vec<OperationResolver> + Send + Sync,
{
    fn operation_resolvers(&self) -> Vec<OperationResolver> {
        self()
    }
}

impl ResolverProvider for Vec<OperationResolver> {
    fn operation_resolvers(&self) -> Vec<OperationResolver> {
        self.clone()
    }
}

/// Supplies the current undo mappings.
pub trait UndoMappingProvider: Send + Sync {
    fn undo_mappings(&self) -> Vec<UndoMapping>;
}

impl<F> UndoMappingProvider for F
where
    F: Fn() -> Vec<UndoMapping> + Send + Sync,
{
    fn undo_mappings(&self) -> Vec<UndoMapping> {
        self()
    }
}

impl UndoMappingProvider for Vec<UndoMapping> {
    fn undo_mappings(&self) -> Vec<UndoMapping> {
        self.clone()
    }
}

/// Provides the ambient services an operation declares.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Fails if any requested service cannot be provided.
    async fn provide(&self, services: &[ServiceKey]) -> anyhow::Result<Services>;
}

/// Resolves a per-call context id (e.g. a space) into services for the handler.
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve(&self, context: &ContextId) -> anyhow::Result<Services>;
}

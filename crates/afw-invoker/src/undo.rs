use std::sync::Arc;

use afw_operation::{OperationDef, UndoMapping, UndoMappingProvider};

/// Looks up undo mappings by operation key over the provider's current list.
#[derive(Clone)]
pub struct UndoRegistry {
    mappings: Arc<dyn UndoMappingProvider>,
}

impl UndoRegistry {
    pub fn new(mappings: impl UndoMappingProvider + 'static) -> Self {
        Self {
            mappings: Arc::new(mappings),
        }
    }

    pub fn from_provider(mappings: Arc<dyn UndoMappingProvider>) -> Self {
        Self { mappings }
    }

    /// First mapping registered for `operation`, if any.
    pub fn lookup(&self, operation: &OperationDef) -> Option<UndoMapping> {
        self.mappings
            .undo_mappings()
            .into_iter()
            .find(|mapping| mapping.operation().key() == operation.key())
    }
}

impl std::fmt::Debug for UndoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use afw_operation::Operation;
    use serde_json::json;

    fn op(key: &str) -> Operation<i64, i64> {
        Operation::new(key)
    }

    fn mapping(from: &str, to: &str) -> UndoMapping {
        UndoMapping::new(&op(from), &op(to), |_: &i64, output: &i64| Some(*output))
    }

    #[test]
    fn lookup_matches_by_key() {
        let registry = UndoRegistry::new(vec![mapping("test.a", "test.undo-a"), mapping("test.b", "test.undo-b")]);
        let found = registry.lookup(&OperationDef::new("test.b")).expect("mapping for b");
        assert_eq!(found.inverse().key().as_str(), "test.undo-b");
        assert!(registry.lookup(&OperationDef::new("test.c")).is_none());
    }

    #[test]
    fn first_registration_wins() {
        let registry = UndoRegistry::new(vec![mapping("test.a", "test.first"), mapping("test.a", "test.second")]);
        let found = registry.lookup(&OperationDef::new("test.a")).expect("mapping");
        assert_eq!(found.inverse().key().as_str(), "test.first");
        assert_eq!(found.derive_context(&json!(1), &json!(2)), Some(json!(2)));
    }

    #[test]
    fn lookups_see_provider_changes() {
        let mappings = Arc::new(Mutex::new(Vec::new()));
        let source = mappings.clone();
        let registry = UndoRegistry::new(move || source.lock().unwrap().clone());
        assert!(registry.lookup(&OperationDef::new("test.a")).is_none());

        mappings.lock().unwrap().push(mapping("test.a", "test.undo-a"));
        assert!(registry.lookup(&OperationDef::new("test.a")).is_some());
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use afw_operation::{ContextId, ContextResolver, ServiceKey, ServiceRuntime, Services};
use anyhow::anyhow;
use async_trait::async_trait;

/// Serves requested keys out of a fixed service set and counts calls.
#[derive(Default)]
pub struct StaticServiceRuntime {
    services: Services,
    calls: AtomicUsize,
}

impl StaticServiceRuntime {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRuntime for StaticServiceRuntime {
    async fn provide(&self, keys: &[ServiceKey]) -> anyhow::Result<Services> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut provided = Services::new();
        for key in keys {
            let service = self
                .services
                .get_shared(key)
                .ok_or_else(|| anyhow!("service '{key}' is not available"))?;
            provided.insert_shared(key.clone(), service);
        }
        Ok(provided)
    }
}

/// Maps context ids to fixed service sets; unknown ids fail to resolve.
#[derive(Default)]
pub struct StaticContextResolver {
    contexts: HashMap<ContextId, Services>,
    calls: AtomicUsize,
}

impl StaticContextResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: impl Into<ContextId>, services: Services) -> Self {
        self.contexts.insert(context.into(), services);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextResolver for StaticContextResolver {
    async fn resolve(&self, context: &ContextId) -> anyhow::Result<Services> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts
            .get(context)
            .cloned()
            .ok_or_else(|| anyhow!("unknown context '{context}'"))
    }
}

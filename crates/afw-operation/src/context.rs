use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{ContextId, InvokeError, InvokeOptions, Operation, OperationDef, OperationKey, ServiceKey};

/// Services made ambient for one invocation, keyed by declared name.
#[derive(Clone, Default)]
pub struct Services {
    entries: IndexMap<ServiceKey, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<ServiceKey>, service: T) -> Self {
        self.insert(key, service);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<ServiceKey>, service: T) {
        self.entries.insert(key.into(), Arc::new(service));
    }

    pub fn insert_shared(&mut self, key: ServiceKey, service: Arc<dyn Any + Send + Sync>) {
        self.entries.insert(key, service);
    }

    /// Returns the service if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &ServiceKey) -> Option<Arc<T>> {
        self.entries
            .get(key)
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    pub fn get_shared(&self, key: &ServiceKey) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ServiceKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Later entries replace earlier ones with the same key.
    pub fn extend(&mut self, other: Services) {
        self.entries.extend(other.entries);
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Opaque reference to a detached followup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FollowupHandle(u64);

impl FollowupHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FollowupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "followup#{}", self.0)
    }
}

/// Dispatch capability the invoker hands to handlers.
pub trait Dispatch: Send + Sync {
    /// Public path: resolves, runs, and publishes an invocation event on success.
    fn invoke(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> BoxFuture<'static, Result<Value, InvokeError>>;

    /// Public path that fails with [`InvokeError::WouldSuspend`] instead of yielding.
    fn invoke_sync(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> Result<Value, InvokeError>;

    /// Runs `op` as a detached followup through the non-publishing path.
    fn schedule(&self, op: Arc<OperationDef>, input: Value) -> Result<FollowupHandle, InvokeError>;

    /// Runs an arbitrary computation as a detached followup.
    fn schedule_effect(
        &self,
        effect: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Result<FollowupHandle, InvokeError>;
}

/// Everything a handler may use besides its input.
#[derive(Clone)]
pub struct InvocationContext {
    operation: OperationKey,
    dispatch: Arc<dyn Dispatch>,
    services: Services,
    context: Option<ContextId>,
}

impl InvocationContext {
    pub fn new(
        operation: OperationKey,
        dispatch: Arc<dyn Dispatch>,
        services: Services,
        context: Option<ContextId>,
    ) -> Self {
        Self {
            operation,
            dispatch,
            services,
            context,
        }
    }

    /// Key of the operation currently being handled.
    pub fn operation(&self) -> &OperationKey {
        &self.operation
    }

    pub fn context_id(&self) -> Option<&ContextId> {
        self.context.as_ref()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn dispatch(&self) -> &Arc<dyn Dispatch> {
        &self.dispatch
    }

    pub fn service<T: Any + Send + Sync>(&self, key: impl Into<ServiceKey>) -> Result<Arc<T>, InvokeError> {
        let key = key.into();
        self.services
            .get::<T>(&key)
            .ok_or_else(|| InvokeError::MissingService {
                key: self.operation.clone(),
                service: key,
            })
    }

    /// Invokes another operation through the public path. The returned future
    /// does not borrow the context.
    pub fn invoke<I, O>(
        &self,
        op: &Operation<I, O>,
        input: I,
    ) -> BoxFuture<'static, Result<O, InvokeError>>
    where
        I: Serialize,
        O: DeserializeOwned + Send + 'static,
    {
        self.invoke_with(op, input, InvokeOptions::default())
    }

    pub fn invoke_with<I, O>(
        &self,
        op: &Operation<I, O>,
        input: I,
        options: InvokeOptions,
    ) -> BoxFuture<'static, Result<O, InvokeError>>
    where
        I: Serialize,
        O: DeserializeOwned + Send + 'static,
    {
        let def = op.def().clone();
        let encoded = op.encode_input(&input);
        let dispatch = self.dispatch.clone();
        async move {
            let output = dispatch.invoke(def.clone(), encoded?, options).await?;
            def.decode_output(output)
        }
        .boxed()
    }

    pub fn invoke_sync<I, O>(&self, op: &Operation<I, O>, input: I) -> Result<O, InvokeError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let encoded = op.encode_input(&input)?;
        let output = self
            .dispatch
            .invoke_sync(op.def().clone(), encoded, InvokeOptions::default())?;
        op.decode_output(output)
    }

    pub fn schedule<I, O>(&self, op: &Operation<I, O>, input: I) -> Result<FollowupHandle, InvokeError>
    where
        I: Serialize,
    {
        let encoded = op.encode_input(&input)?;
        self.dispatch.schedule(op.def().clone(), encoded)
    }

    pub fn schedule_effect<F>(&self, effect: F) -> Result<FollowupHandle, InvokeError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.dispatch.schedule_effect(effect.boxed())
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("operation", &self.operation)
            .field("services", &self.services)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

//! The operation invoker: resolves a handler per call, runs it, and publishes
//! successful public invocations.

use std::sync::{Arc, Weak};

use afw_operation::{
    ContextResolver, Dispatch, FollowupHandle, InvocationContext, InvokeError, InvokeOptions,
    Operation, OperationDef, ResolverProvider, ServiceRuntime, Services,
};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, error};

use crate::bus::{InvocationBus, InvocationStream};
use crate::followup::{FollowupScheduler, InvokeFn};
use crate::outcome::Outcome;
use crate::resolution::select_resolver;

/// Cheap to clone; clones share resolvers, the event bus and the followup set.
#[derive(Clone)]
pub struct Invoker {
    inner: Arc<InvokerInner>,
}

struct InvokerInner {
    resolvers: Arc<dyn ResolverProvider>,
    services: Option<Arc<dyn ServiceRuntime>>,
    contexts: Option<Arc<dyn ContextResolver>>,
    bus: InvocationBus,
    followups: FollowupScheduler,
}

pub struct InvokerBuilder {
    resolvers: Arc<dyn ResolverProvider>,
    services: Option<Arc<dyn ServiceRuntime>>,
    contexts: Option<Arc<dyn ContextResolver>>,
}

impl InvokerBuilder {
    /// Provides the services operations declare.
    pub fn service_runtime(mut self, runtime: Arc<dyn ServiceRuntime>) -> Self {
        self.services = Some(runtime);
        self
    }

    /// Resolves `InvokeOptions::context` into services before the handler runs.
    pub fn context_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.contexts = Some(resolver);
        self
    }

    pub fn build(self) -> Invoker {
        let inner = Arc::new_cyclic(|weak: &Weak<InvokerInner>| {
            let weak = weak.clone();
            let replay: InvokeFn = Arc::new(move |op: Arc<OperationDef>, input: Value| {
                match weak.upgrade() {
                    Some(inner) => Invoker { inner }.invoke_core(op, input, InvokeOptions::default()),
                    None => future::ready(Err(InvokeError::InvokerClosed)).boxed(),
                }
            });
            InvokerInner {
                resolvers: self.resolvers,
                services: self.services,
                contexts: self.contexts,
                bus: InvocationBus::default(),
                followups: FollowupScheduler::new(replay),
            }
        });
        Invoker { inner }
    }
}

impl Invoker {
    pub fn new(resolvers: impl ResolverProvider + 'static) -> Self {
        Self::builder(resolvers).build()
    }

    pub fn builder(resolvers: impl ResolverProvider + 'static) -> InvokerBuilder {
        Self::builder_from_provider(Arc::new(resolvers))
    }

    pub fn builder_from_provider(resolvers: Arc<dyn ResolverProvider>) -> InvokerBuilder {
        InvokerBuilder {
            resolvers,
            services: None,
            contexts: None,
        }
    }

    pub async fn invoke<I, O>(&self, op: &Operation<I, O>, input: I) -> Result<O, InvokeError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.invoke_with(op, input, InvokeOptions::default()).await
    }

    pub async fn invoke_with<I, O>(
        &self,
        op: &Operation<I, O>,
        input: I,
        options: InvokeOptions,
    ) -> Result<O, InvokeError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let encoded = op.encode_input(&input)?;
        let output = self.invoke_value(op.def().clone(), encoded, options).await?;
        op.decode_output(output)
    }

    /// Public untyped path. On success the invocation is published to every
    /// current subscriber before the returned future resolves.
    pub fn invoke_value(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> BoxFuture<'static, Result<Value, InvokeError>> {
        let invoker = self.clone();
        async move {
            let output = invoker
                .invoke_core(op.clone(), input.clone(), options)
                .await?;
            invoker.inner.bus.publish(op, input, output.clone());
            Ok(output)
        }
        .boxed()
    }

    /// Like [`Invoker::invoke`], but never fails: the error is logged and
    /// returned alongside an empty `data`.
    pub async fn invoke_outcome<I, O>(&self, op: &Operation<I, O>, input: I) -> Outcome<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.invoke_outcome_with(op, input, InvokeOptions::default()).await
    }

    pub async fn invoke_outcome_with<I, O>(
        &self,
        op: &Operation<I, O>,
        input: I,
        options: InvokeOptions,
    ) -> Outcome<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        match self.invoke_with(op, input, options).await {
            Ok(data) => Outcome::ok(data),
            Err(err) => {
                error!(operation = %op.key(), error = %err, "invocation failed");
                Outcome::err(err)
            }
        }
    }

    /// Completes the invocation without yielding. Fails with
    /// [`InvokeError::WouldSuspend`] if any step of the chain would suspend; in
    /// that case nothing is published.
    ///
    /// Handlers that touch tokio timers or I/O must be run inside a runtime
    /// context even when called this way.
    pub fn invoke_sync<I, O>(&self, op: &Operation<I, O>, input: I) -> Result<O, InvokeError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.invoke_sync_with(op, input, InvokeOptions::default())
    }

    pub fn invoke_sync_with<I, O>(
        &self,
        op: &Operation<I, O>,
        input: I,
        options: InvokeOptions,
    ) -> Result<O, InvokeError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let encoded = op.encode_input(&input)?;
        let output = self.invoke_value_sync(op.def().clone(), encoded, options)?;
        op.decode_output(output)
    }

    pub fn invoke_value_sync(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> Result<Value, InvokeError> {
        let key = op.key().clone();
        match self.invoke_value(op, input, options).now_or_never() {
            Some(result) => result,
            None => {
                debug!(operation = %key, "synchronous invocation would suspend");
                Err(InvokeError::WouldSuspend(key))
            }
        }
    }

    /// Resolve and run without publishing. Used for followups and undo replay.
    pub(crate) fn invoke_core(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> BoxFuture<'static, Result<Value, InvokeError>> {
        let invoker = self.clone();
        async move {
            let key = op.key().clone();
            let resolver = select_resolver(invoker.inner.resolvers.operation_resolvers(), &key, &input)
                .ok_or_else(|| InvokeError::NoHandler(key.clone()))?;

            let mut services = Services::new();
            if let Some(context) = &options.context {
                if let Some(contexts) = &invoker.inner.contexts {
                    let resolved = contexts
                        .resolve(context)
                        .await
                        .map_err(|source| InvokeError::Context {
                            context: context.clone(),
                            source,
                        })?;
                    services.extend(resolved);
                }
            }
            if !op.services().is_empty() {
                if let Some(runtime) = &invoker.inner.services {
                    let provided = runtime
                        .provide(op.services())
                        .await
                        .map_err(|source| InvokeError::Services {
                            key: key.clone(),
                            source,
                        })?;
                    services.extend(provided);
                }
            }

            let dispatch: Arc<dyn Dispatch> = Arc::new(invoker.clone());
            let ctx = InvocationContext::new(key.clone(), dispatch, services, options.context);
            debug!(operation = %key, position = ?resolver.position(), "invoking handler");
            let output = resolver
                .call(input, ctx)
                .await
                .map_err(InvokeError::from_handler)?;
            debug!(operation = %key, "handler completed");
            Ok(output)
        }
        .boxed()
    }

    /// Subscribes to successful public invocations from now on.
    pub fn invocations(&self) -> InvocationStream {
        self.inner.bus.subscribe()
    }

    /// Number of subscribers whose stream is still open.
    pub fn subscriber_count(&self) -> usize {
        self.inner.bus.subscriber_count()
    }

    /// Sequence number of the most recently published invocation.
    pub(crate) fn published(&self) -> u64 {
        self.inner.bus.published()
    }

    pub fn followups(&self) -> &FollowupScheduler {
        &self.inner.followups
    }

    pub fn pending_followups(&self) -> usize {
        self.inner.followups.pending()
    }

    pub async fn await_followups(&self) {
        self.inner.followups.await_all().await
    }
}

impl Dispatch for Invoker {
    fn invoke(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> BoxFuture<'static, Result<Value, InvokeError>> {
        self.invoke_value(op, input, options)
    }

    fn invoke_sync(
        &self,
        op: Arc<OperationDef>,
        input: Value,
        options: InvokeOptions,
    ) -> Result<Value, InvokeError> {
        self.invoke_value_sync(op, input, options)
    }

    fn schedule(&self, op: Arc<OperationDef>, input: Value) -> Result<FollowupHandle, InvokeError> {
        self.inner.followups.schedule(op, input)
    }

    fn schedule_effect(
        &self,
        effect: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Result<FollowupHandle, InvokeError> {
        self.inner.followups.spawn_boxed(effect)
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("published", &self.published())
            .field("followups", &self.inner.followups)
            .finish_non_exhaustive()
    }
}

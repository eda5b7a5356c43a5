use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{InvocationContext, InvokeError, Operation, OperationDef, OperationKey};

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Untyped handler: JSON input in, JSON output out.
pub trait OperationHandler: Send + Sync {
    fn handle(&self, input: Value, ctx: InvocationContext) -> HandlerFuture;
}

impl<F> OperationHandler for F
where
    F: Fn(Value, InvocationContext) -> HandlerFuture + Send + Sync,
{
    fn handle(&self, input: Value, ctx: InvocationContext) -> HandlerFuture {
        self(input, ctx)
    }
}

pub type InputFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Ordering bucket of a resolver among candidates for the same operation.
///
/// Declaration order is the precedence order: every `Hoist` candidate beats
/// every `Default` one, which beats every `Fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Hoist,
    #[default]
    Default,
    Fallback,
}

/// A registered (operation, handler) pair with optional filter and position.
#[derive(Clone)]
pub struct OperationResolver {
    operation: Arc<OperationDef>,
    handler: Arc<dyn OperationHandler>,
    filter: Option<InputFilter>,
    position: Position,
}

impl OperationResolver {
    /// Registers an async handler for `op`.
    pub fn new<I, O, F, Fut>(op: &Operation<I, O>, handler: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        F: Fn(I, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::builder(op).handler(handler)
    }

    /// Registers a handler that never suspends.
    pub fn sync<I, O, F>(op: &Operation<I, O>, handler: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: Serialize + 'static,
        F: Fn(I, &InvocationContext) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self::builder(op).sync_handler(handler)
    }

    pub fn builder<I, O>(op: &Operation<I, O>) -> ResolverBuilder<I, O> {
        ResolverBuilder {
            operation: op.def().clone(),
            filter: None,
            position: Position::Default,
            _marker: PhantomData,
        }
    }

    /// Registers an untyped handler.
    pub fn from_handler(operation: Arc<OperationDef>, handler: Arc<dyn OperationHandler>) -> Self {
        Self {
            operation,
            handler,
            filter: None,
            position: Position::Default,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_raw_filter(mut self, filter: InputFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn operation(&self) -> &Arc<OperationDef> {
        &self.operation
    }

    pub fn key(&self) -> &OperationKey {
        self.operation.key()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// True if the resolver has no filter or its filter accepts `input`.
    pub fn accepts(&self, input: &Value) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(input))
    }

    pub fn call(&self, input: Value, ctx: InvocationContext) -> HandlerFuture {
        self.handler.handle(input, ctx)
    }
}

impl fmt::Debug for OperationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationResolver")
            .field("operation", self.operation.key())
            .field("position", &self.position)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Typed builder so filters and handlers see the operation's input type.
pub struct ResolverBuilder<I, O> {
    operation: Arc<OperationDef>,
    filter: Option<InputFilter>,
    position: Position,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ResolverBuilder<I, O>
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
{
    /// Inputs that fail to decode as `I` are rejected by the filter.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&I) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(move |input: &Value| {
            I::deserialize(input).map(|typed| filter(&typed)).unwrap_or(false)
        }));
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn hoist(self) -> Self {
        self.position(Position::Hoist)
    }

    pub fn fallback(self) -> Self {
        self.position(Position::Fallback)
    }

    pub fn handler<F, Fut>(self, handler: F) -> OperationResolver
    where
        F: Fn(I, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let operation = self.operation.clone();
        let wrapped = move |input: Value, ctx: InvocationContext| -> HandlerFuture {
            let typed = match decode_input::<I>(&operation, input) {
                Ok(typed) => typed,
                Err(err) => return future::ready(Err(err.into())).boxed(),
            };
            let pending = handler(typed, ctx);
            async move { encode_output(pending.await?) }.boxed()
        };
        self.finish(Arc::new(wrapped))
    }

    pub fn sync_handler<F>(self, handler: F) -> OperationResolver
    where
        F: Fn(I, &InvocationContext) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        let operation = self.operation.clone();
        let wrapped = move |input: Value, ctx: InvocationContext| -> HandlerFuture {
            let result = decode_input::<I>(&operation, input)
                .map_err(anyhow::Error::from)
                .and_then(|typed| handler(typed, &ctx))
                .and_then(encode_output);
            future::ready(result).boxed()
        };
        self.finish(Arc::new(wrapped))
    }

    fn finish(self, handler: Arc<dyn OperationHandler>) -> OperationResolver {
        OperationResolver {
            operation: self.operation,
            handler,
            filter: self.filter,
            position: self.position,
        }
    }
}

fn decode_input<I: DeserializeOwned>(operation: &OperationDef, input: Value) -> Result<I, InvokeError> {
    serde_json::from_value(input).map_err(|source| InvokeError::DecodeInput {
        key: operation.key().clone(),
        source,
    })
}

fn encode_output<O: Serialize>(output: O) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Number {
        value: i64,
    }

    fn compute() -> Operation<Number, Number> {
        Operation::new("test.compute")
    }

    #[test]
    fn positions_order_hoist_default_fallback() {
        let mut positions = vec![Position::Fallback, Position::Default, Position::Hoist];
        positions.sort();
        assert_eq!(positions, vec![Position::Hoist, Position::Default, Position::Fallback]);
        assert_eq!(serde_json::to_value(Position::Hoist).unwrap(), json!("hoist"));
    }

    #[test]
    fn typed_filter_rejects_undecodable_input() {
        let resolver = OperationResolver::builder(&compute())
            .filter(|input: &Number| input.value == 1)
            .sync_handler(|input, _| Ok(Number { value: input.value }));
        assert!(resolver.accepts(&json!({ "value": 1 })));
        assert!(!resolver.accepts(&json!({ "value": 2 })));
        assert!(!resolver.accepts(&json!("not a number")));
    }

    #[test]
    fn unfiltered_resolver_accepts_everything() {
        let resolver = OperationResolver::sync(&compute(), |input, _| Ok(Number { value: input.value }))
            .with_position(Position::Fallback);
        assert!(resolver.accepts(&json!(null)));
        assert_eq!(resolver.position(), Position::Fallback);
        assert_eq!(resolver.key().as_str(), "test.compute");
    }
}

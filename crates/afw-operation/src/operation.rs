use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{ContextId, InvokeError, OperationKey, ServiceKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMeta {
    pub key: OperationKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Untyped operation definition. This is what resolvers, events and history
/// entries carry; equality is by key.
#[derive(Debug, Clone)]
pub struct OperationDef {
    meta: OperationMeta,
    services: Vec<ServiceKey>,
}

impl OperationDef {
    pub fn new(key: impl Into<OperationKey>) -> Self {
        Self {
            meta: OperationMeta {
                key: key.into(),
                name: None,
                description: None,
            },
            services: Vec::new(),
        }
    }

    pub fn key(&self) -> &OperationKey {
        &self.meta.key
    }

    pub fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    /// Ambient services the handler expects to find in its context.
    pub fn services(&self) -> &[ServiceKey] {
        &self.services
    }

    pub fn decode_output<O: DeserializeOwned>(&self, output: Value) -> Result<O, InvokeError> {
        serde_json::from_value(output).map_err(|source| InvokeError::DecodeOutput {
            key: self.key().clone(),
            source,
        })
    }
}

impl PartialEq for OperationDef {
    fn eq(&self, other: &Self) -> bool {
        self.meta.key == other.meta.key
    }
}

impl Eq for OperationDef {}

/// Typed handle on an operation definition.
///
/// `I` and `O` only exist at the edges: inputs are encoded to JSON before
/// dispatch and outputs decoded after it.
pub struct Operation<I, O> {
    def: Arc<OperationDef>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Operation<I, O> {
    pub fn new(key: impl Into<OperationKey>) -> Self {
        Self {
            def: Arc::new(OperationDef::new(key)),
            _marker: PhantomData,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.def).meta.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.def).meta.description = Some(description.into());
        self
    }

    pub fn with_services<S>(mut self, services: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<ServiceKey>,
    {
        Arc::make_mut(&mut self.def)
            .services
            .extend(services.into_iter().map(Into::into));
        self
    }

    pub fn key(&self) -> &OperationKey {
        self.def.key()
    }

    pub fn def(&self) -> &Arc<OperationDef> {
        &self.def
    }

    pub fn encode_input(&self, input: &I) -> Result<Value, InvokeError>
    where
        I: Serialize,
    {
        serde_json::to_value(input).map_err(|source| InvokeError::EncodeInput {
            key: self.key().clone(),
            source,
        })
    }

    pub fn decode_input(&self, input: Value) -> Result<I, InvokeError>
    where
        I: DeserializeOwned,
    {
        serde_json::from_value(input).map_err(|source| InvokeError::DecodeInput {
            key: self.key().clone(),
            source,
        })
    }

    pub fn decode_output(&self, output: Value) -> Result<O, InvokeError>
    where
        O: DeserializeOwned,
    {
        self.def.decode_output(output)
    }
}

impl<I, O> Clone for Operation<I, O> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            _marker: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for Operation<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Operation").field(self.key()).finish()
    }
}

impl<I, O> PartialEq for Operation<I, O> {
    fn eq(&self, other: &Self) -> bool {
        self.def == other.def
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Context to resolve and inject before the handler runs.
    pub context: Option<ContextId>,
}

impl InvokeOptions {
    pub fn in_context(context: impl Into<ContextId>) -> Self {
        Self {
            context: Some(context.into()),
        }
    }
}

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use crate::{Operation, OperationDef};

type DeriveFn = Arc<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>;
type MessageFn = Arc<dyn Fn(&Value, &Value) -> Option<String> + Send + Sync>;

/// Label shown when an undoable operation completes.
#[derive(Clone)]
pub enum UndoMessage {
    Static(String),
    Derived(MessageFn),
}

impl fmt::Debug for UndoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoMessage::Static(message) => f.debug_tuple("Static").field(message).finish(),
            UndoMessage::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Declares that `operation` is reversed by `inverse`, with the inverse input
/// derived from the original input and output.
#[derive(Clone)]
pub struct UndoMapping {
    operation: Arc<OperationDef>,
    inverse: Arc<OperationDef>,
    derive: DeriveFn,
    message: Option<UndoMessage>,
}

impl UndoMapping {
    /// `derive` returns `None` when a particular invocation is not undoable.
    /// Inputs or outputs that fail to decode are treated the same way.
    pub fn new<I, O, II, IO, F>(op: &Operation<I, O>, inverse: &Operation<II, IO>, derive: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: DeserializeOwned + 'static,
        II: Serialize + 'static,
        F: Fn(&I, &O) -> Option<II> + Send + Sync + 'static,
    {
        let key = op.key().clone();
        let wrapped = move |input: &Value, output: &Value| -> Option<Value> {
            let (input, output) = match (I::deserialize(input), O::deserialize(output)) {
                (Ok(input), Ok(output)) => (input, output),
                (Err(err), _) | (_, Err(err)) => {
                    warn!(operation = %key, error = %err, "undo mapping could not decode invocation");
                    return None;
                }
            };
            let inverse_input = derive(&input, &output)?;
            match serde_json::to_value(inverse_input) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(operation = %key, error = %err, "undo mapping could not encode inverse input");
                    None
                }
            }
        };
        Self::from_raw(op.def().clone(), inverse.def().clone(), Arc::new(wrapped))
    }

    pub fn from_raw(
        operation: Arc<OperationDef>,
        inverse: Arc<OperationDef>,
        derive: Arc<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>,
    ) -> Self {
        Self {
            operation,
            inverse,
            derive,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(UndoMessage::Static(message.into()));
        self
    }

    /// Message computed from the typed input and output of each invocation.
    pub fn with_message_fn<I, O, F>(mut self, message: F) -> Self
    where
        I: DeserializeOwned + 'static,
        O: DeserializeOwned + 'static,
        F: Fn(&I, &O) -> String + Send + Sync + 'static,
    {
        let derived = move |input: &Value, output: &Value| -> Option<String> {
            let input = I::deserialize(input).ok()?;
            let output = O::deserialize(output).ok()?;
            Some(message(&input, &output))
        };
        self.message = Some(UndoMessage::Derived(Arc::new(derived)));
        self
    }

    pub fn operation(&self) -> &Arc<OperationDef> {
        &self.operation
    }

    pub fn inverse(&self) -> &Arc<OperationDef> {
        &self.inverse
    }

    pub fn derive_context(&self, input: &Value, output: &Value) -> Option<Value> {
        (self.derive)(input, output)
    }

    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    pub fn message(&self, input: &Value, output: &Value) -> Option<String> {
        match self.message.as_ref()? {
            UndoMessage::Static(message) => Some(message.clone()),
            UndoMessage::Derived(derive) => derive(input, output),
        }
    }
}

impl fmt::Debug for UndoMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoMapping")
            .field("operation", self.operation.key())
            .field("inverse", self.inverse.key())
            .field("message", &self.message)
            .finish()
    }
}

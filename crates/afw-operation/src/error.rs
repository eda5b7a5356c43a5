use thiserror::Error;

use crate::{ContextId, OperationKey, ServiceKey};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("no handler found for operation '{0}'")]
    NoHandler(OperationKey),
    #[error("undo history is empty")]
    EmptyHistory,
    #[error("operation '{0}' cannot complete synchronously")]
    WouldSuspend(OperationKey),
    #[error("failed to encode input for '{key}': {source}")]
    EncodeInput {
        key: OperationKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode input for '{key}': {source}")]
    DecodeInput {
        key: OperationKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode output of '{key}': {source}")]
    DecodeOutput {
        key: OperationKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("operation '{key}' requires service '{service}'")]
    MissingService {
        key: OperationKey,
        service: ServiceKey,
    },
    #[error("failed to resolve context '{context}': {source}")]
    Context {
        context: ContextId,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to provide services for '{key}': {source}")]
    Services {
        key: OperationKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("no async runtime available to run followup")]
    NoRuntime,
    #[error("operation invoker has been dropped")]
    InvokerClosed,
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl InvokeError {
    /// Maps a handler failure to an invoke error. Errors that already are
    /// `InvokeError`s (e.g. a nested invocation propagated with `?`) are passed
    /// through as-is.
    pub fn from_handler(err: anyhow::Error) -> Self {
        match err.downcast::<InvokeError>() {
            Ok(inner) => inner,
            Err(err) => InvokeError::Handler(err),
        }
    }

    pub fn is_no_handler(&self) -> bool {
        matches!(self, InvokeError::NoHandler(_))
    }
}

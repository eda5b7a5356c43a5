//! Shared operation contracts: definitions, resolver registrations, undo mappings,
//! and the capability handed to every handler.

pub mod builtins;

mod context;
mod error;
mod key;
mod operation;
mod provider;
mod resolver;
mod undo;

pub use context::{Dispatch, FollowupHandle, InvocationContext, Services};
pub use error::InvokeError;
pub use key::{ContextId, OperationKey, ServiceKey};
pub use operation::{InvokeOptions, Operation, OperationDef, OperationMeta};
pub use provider::{ContextResolver, ResolverProvider, ServiceRuntime, UndoMappingProvider};
pub use resolver::{
    HandlerFuture, InputFilter, OperationHandler, OperationResolver, Position, ResolverBuilder,
};
pub use undo::{UndoMapping, UndoMessage};

//! Operation invocation runtime.
//!
//! [`Invoker`] resolves and runs operation handlers and broadcasts successful
//! public invocations. [`FollowupScheduler`] runs detached background work for
//! handlers, and [`HistoryTracker`] turns the invocation stream into an undo
//! history driven by [`UndoRegistry`] mappings.

mod bus;
mod config;
mod followup;
mod history;
mod invoker;
mod outcome;
mod resolution;
mod undo;

pub use bus::{InvocationEvent, InvocationStream};
pub use config::{DEFAULT_HISTORY_CAPACITY, HISTORY_CAPACITY_ENV, HistoryConfig, UNDO_NOTIFICATIONS_ENV};
pub use followup::FollowupScheduler;
pub use history::{HistoryEntry, HistoryTracker};
pub use invoker::{Invoker, InvokerBuilder};
pub use outcome::Outcome;
pub use undo::UndoRegistry;

pub use afw_operation as operation;

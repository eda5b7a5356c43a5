//! Fixtures for exercising the invoker: sample operations with their
//! resolvers and undo mappings, mutable providers, static service runtimes,
//! and test logging.

pub mod ops;

mod logging;
mod resolvers;
mod services;

pub use logging::init_test_logging;
pub use resolvers::{MappingSet, ResolverSet};
pub use services::{StaticContextResolver, StaticServiceRuntime};

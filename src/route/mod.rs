//! Route resolution: cache, state machine, view lookup and navigation.

mod cache;
mod navigator;
mod resolver;
mod views;

pub use cache::RouteCache;
pub use navigator::{Navigate, Navigator};
pub use resolver::{NextRootHint, RouteResolver, SessionFlags, TypeQuery, TypeQueryState};
pub use views::{ViewLoader, ViewLookupError, ViewRegistry};

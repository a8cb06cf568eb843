//! GraphQL access: operations, the ordered request pipeline, transport and
//! the query cache.

mod client;
mod operation;
mod pipeline;
mod query_cache;
mod resolve_url;
pub mod stages;
mod transport;

pub use client::{FetchError, GraphqlClient};
pub use operation::{Operation, OperationKind};
pub use pipeline::{
    GraphqlReply, GraphqlRequest, Next, Pipeline, PipelineBuilder, PipelineError, Stage,
};
pub use query_cache::QueryCache;
pub use resolve_url::{RESOLVE_URL, fetch_route, resolve_url_operation};
pub use transport::{HttpTransport, Transport};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use vetrina_types::GraphqlError;

use super::{
    operation::Operation,
    pipeline::{Pipeline, PipelineError},
    query_cache::QueryCache,
};

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("graphql errors: {}", join_messages(.0))]
    Graphql(Vec<GraphqlError>),
    #[error("response carried no data")]
    MissingData,
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl FetchError {
    /// True for failures to reach the backend or get an answer from it.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FetchError::Pipeline(PipelineError::Transport(_) | PipelineError::Status { .. })
        )
    }
}

fn join_messages(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|error| error.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pipeline plus query cache, the way page code talks to the backend.
#[derive(Clone)]
pub struct GraphqlClient {
    pipeline: Pipeline,
    cache: QueryCache,
}

impl GraphqlClient {
    pub fn new(pipeline: Pipeline, cache: QueryCache) -> Self {
        Self { pipeline, cache }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Cache-first query. Results are cached only when no errors survive
    /// normalization.
    pub async fn query(&self, operation: Operation) -> Result<Value, FetchError> {
        if let Some(data) = self.cache.get(&operation) {
            debug!(
                target = "vetrina::graphql",
                operation = operation.label(),
                "query served from cache"
            );
            return Ok(data);
        }

        let data = self.execute(&operation).await?;
        self.cache.insert(&operation, data.clone());
        Ok(data)
    }

    pub async fn mutate(&self, operation: Operation) -> Result<Value, FetchError> {
        self.execute(&operation).await
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, FetchError> {
        let reply = self.pipeline.execute(operation.clone()).await?;
        let response = reply.response;
        if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
            return Err(FetchError::Graphql(errors));
        }
        response.data.ok_or(FetchError::MissingData)
    }
}

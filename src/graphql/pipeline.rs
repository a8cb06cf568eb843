//! Ordered request pipeline.
//!
//! Every outbound GraphQL call passes through the same named stages before
//! reaching the terminal [`Transport`]. Each stage sees the request on the way
//! out and the reply on the way back, and decides whether and how often to
//! call the rest of the chain.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;
use vetrina_types::GraphqlResponse;

use super::{operation::Operation, transport::Transport};

/// Request as it travels down the pipeline.
#[derive(Debug, Clone)]
pub struct GraphqlRequest {
    pub operation: Operation,
    pub headers: HeaderMap,
}

impl GraphqlRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            headers: HeaderMap::new(),
        }
    }
}

/// Reply as it travels back up the pipeline.
#[derive(Debug, Clone, Default)]
pub struct GraphqlReply {
    pub response: GraphqlResponse,
    pub headers: HeaderMap,
}

impl GraphqlReply {
    pub fn new(response: GraphqlResponse) -> Self {
        Self {
            response,
            headers: HeaderMap::new(),
        }
    }
}

/// Failures that abort a pipeline invocation.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend responded with HTTP {status}")]
    Status { status: u16 },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl PipelineError {
    /// Network-level failures, server errors and throttling are worth
    /// another attempt; client errors and malformed traffic are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Transport(_) => true,
            PipelineError::Status { status } => *status >= 500 || *status == 429,
            PipelineError::Decode(_) | PipelineError::Request(_) => false,
        }
    }
}

/// One named transform in the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(
        &self,
        request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError>;
}

/// Cursor over the stages that have not run yet.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: GraphqlRequest) -> Result<GraphqlReply, PipelineError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    transport: self.transport,
                };
                stage.call(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Composed stages plus transport.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            transport,
        }
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub async fn execute(&self, operation: Operation) -> Result<GraphqlReply, PipelineError> {
        let next = Next {
            stages: &self.stages,
            transport: self.transport.as_ref(),
        };
        next.run(GraphqlRequest::new(operation)).await
    }
}

pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// Append a stage; stages run in the order they are added.
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
            transport: self.transport,
        }
    }
}

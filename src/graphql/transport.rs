//! Terminal pipeline step: putting a request on the wire.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use tracing::debug;
use vetrina_types::GraphqlResponse;

use super::pipeline::{GraphqlReply, GraphqlRequest, PipelineError};

/// Sends a fully prepared request and returns the decoded reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: GraphqlRequest) -> Result<GraphqlReply, PipelineError>;
}

/// HTTP transport against the backend GraphQL endpoint.
///
/// Queries travel as `GET` with the compacted document in the URL so edge
/// caches can serve them; mutations are `POST`ed as JSON.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Request(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn user_agent() -> &'static str {
        concat!("vetrina/", env!("CARGO_PKG_VERSION"))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL used for a query sent as `GET`.
    pub fn query_url(&self, request: &GraphqlRequest) -> Url {
        let operation = &request.operation;
        let mut url = self.endpoint.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", &operation.compact_document());
            if let Some(name) = operation.name.as_deref() {
                pairs.append_pair("operationName", name);
            }
            pairs.append_pair("variables", &operation.variables.to_string());
        }
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: GraphqlRequest) -> Result<GraphqlReply, PipelineError> {
        let operation = &request.operation;
        let builder = if operation.is_mutation() {
            let body = json!({
                "query": operation.document.as_ref(),
                "operationName": operation.name,
                "variables": operation.variables,
            });
            self.client.post(self.endpoint.clone()).json(&body)
        } else {
            self.client.get(self.query_url(&request))
        };

        let response = builder
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))?;

        debug!(
            target = "vetrina::graphql",
            operation = operation.label(),
            kind = operation.kind.as_str(),
            status = status.as_u16(),
            bytes = bytes.len(),
            "backend replied"
        );

        if !status.is_success() {
            return Err(PipelineError::Status {
                status: status.as_u16(),
            });
        }

        let response: GraphqlResponse = serde_json::from_slice(&bytes)
            .map_err(|err| PipelineError::Decode(err.to_string()))?;

        Ok(GraphqlReply { response, headers })
    }
}

//! Stages that attach visitor context read from the persisted store.
//!
//! Each call derives a fresh [`RequestContext`], so a retried attempt sees
//! the latest sign-in and store selection.

use async_trait::async_trait;
use axum::http::{
    HeaderName, HeaderValue,
    header::AUTHORIZATION,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::graphql::pipeline::{GraphqlReply, GraphqlRequest, Next, PipelineError, Stage};
use crate::persistence::{ContextDefaults, PersistedStore, RequestContext};

pub const CACHE_ID_HEADER: &str = "x-magento-cache-id";
pub const CACHE_ID_KEY: &str = "magento_cache_id";
pub const STORE_HEADER: &str = "store";
pub const CURRENCY_HEADER: &str = "content-currency";

fn header_value(value: &str, header: &'static str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target = "vetrina::graphql", header, "dropping invalid header value");
            None
        }
    }
}

/// Adds `Authorization: Bearer <token>` for signed-in visitors.
#[derive(Clone)]
pub struct AuthStage {
    store: PersistedStore,
    defaults: ContextDefaults,
}

impl AuthStage {
    pub fn new(store: PersistedStore, defaults: ContextDefaults) -> Self {
        Self { store, defaults }
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn call(
        &self,
        mut request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        let context = RequestContext::from_store(&self.store, &self.defaults);
        match context
            .auth_token
            .as_deref()
            .and_then(|token| header_value(&format!("Bearer {token}"), "authorization"))
        {
            Some(value) => {
                request.headers.insert(AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }
        next.run(request).await
    }
}

/// Sends the backend's cache id with each call and keeps the latest one the
/// backend hands back.
#[derive(Clone)]
pub struct CacheIdStage {
    store: PersistedStore,
}

impl CacheIdStage {
    pub fn new(store: PersistedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for CacheIdStage {
    fn name(&self) -> &'static str {
        "cache_id"
    }

    async fn call(
        &self,
        mut request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        if let Some(value) = self
            .store
            .get_string(CACHE_ID_KEY)
            .and_then(|id| header_value(&id, CACHE_ID_HEADER))
        {
            request
                .headers
                .insert(HeaderName::from_static(CACHE_ID_HEADER), value);
        }

        let reply = next.run(request).await?;

        if let Some(returned) = reply
            .headers
            .get(CACHE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            && self.store.get_string(CACHE_ID_KEY).as_deref() != Some(returned)
        {
            debug!(target = "vetrina::graphql", "backend cache id changed");
            self.store
                .set_item(CACHE_ID_KEY, &Value::String(returned.to_string()), None);
        }

        Ok(reply)
    }
}

/// Adds the `Store` header and, when chosen, `Content-Currency`.
#[derive(Clone)]
pub struct StoreStage {
    store: PersistedStore,
    defaults: ContextDefaults,
}

impl StoreStage {
    pub fn new(store: PersistedStore, defaults: ContextDefaults) -> Self {
        Self { store, defaults }
    }
}

#[async_trait]
impl Stage for StoreStage {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn call(
        &self,
        mut request: GraphqlRequest,
        next: Next<'_>,
    ) -> Result<GraphqlReply, PipelineError> {
        let context = RequestContext::from_store(&self.store, &self.defaults);
        if let Some(value) = header_value(&context.store_code, STORE_HEADER) {
            request
                .headers
                .insert(HeaderName::from_static(STORE_HEADER), value);
        }
        let currency = context
            .currency
            .as_deref()
            .and_then(|currency| header_value(currency, CURRENCY_HEADER));
        match currency {
            Some(value) => {
                request
                    .headers
                    .insert(HeaderName::from_static(CURRENCY_HEADER), value);
            }
            None => {
                request.headers.remove(CURRENCY_HEADER);
            }
        }
        next.run(request).await
    }
}

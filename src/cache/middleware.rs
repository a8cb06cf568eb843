//! Response cache middleware for the render route.
//!
//! The key covers the full request URL and every cookie-persisted entry of
//! the visitor's namespace, so two visitors only share a page when their
//! stored state is identical.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::persistence::{CookieStorage, PersistedStore};

use super::{
    fingerprint::{CacheFingerprint, fingerprint},
    store::{CachedPage, ResponseCache},
};

const MAX_CACHED_BODY: usize = 4 * 1024 * 1024;

/// Shared cache state for the middleware.
#[derive(Clone)]
pub struct CacheState {
    pub cache: ResponseCache,
    pub namespace: Arc<str>,
}

/// How the response cache took part in serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    Hit,
    Miss,
    Bypass,
}

impl CacheDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }
}

/// Fingerprint for an inbound request: path plus query, and the sorted
/// persisted-store snapshot read from its cookies.
pub fn request_fingerprint<B>(request: &Request<B>, namespace: &str) -> CacheFingerprint {
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let store = PersistedStore::new(
        namespace,
        Arc::new(CookieStorage::from_headers(request.headers())),
    );
    fingerprint(url, store.get_all())
}

/// Serve cached renders and store fresh `200 OK` renders.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.cache.is_enabled() || request.method() != Method::GET {
        return with_disposition(next.run(request).await, CacheDisposition::Bypass);
    }

    let key = request_fingerprint(&request, &state.namespace);

    if let Some(cached) = state.cache.lookup(&key) {
        debug!(cache = "response", outcome = "hit", "serving cached render");
        return with_disposition(build_response(cached), CacheDisposition::Hit);
    }

    debug!(cache = "response", outcome = "miss", "rendering");
    let response = with_disposition(next.run(request).await, CacheDisposition::Miss);

    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect();
    state
        .cache
        .store(key, parts.status.as_u16(), headers, bytes.clone());

    Response::from_parts(parts, Body::from(bytes))
}

fn with_disposition(mut response: Response, disposition: CacheDisposition) -> Response {
    response.extensions_mut().insert(disposition);
    response
}

fn build_response(cached: CachedPage) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

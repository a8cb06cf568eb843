//! Pass-through of backend paths (`/graphql`, `/rest`, `/media`).

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use metrics::counter;
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use crate::{
    application::error::HttpError,
    infra::{error::InfraError, telemetry::METRIC_PROXY_FAILURE},
};

const SOURCE: &str = "infra::http::proxy::forward";

/// First path segments owned by the backend.
pub const PROXIED_PREFIXES: &[&str] = &["graphql", "rest", "media"];

const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// True when `path` is `/<prefix>` or below it for a proxied prefix.
pub fn is_proxied_path(path: &str) -> bool {
    let first = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();
    PROXIED_PREFIXES.contains(&first)
}

#[derive(Debug, Clone)]
pub struct ProxyState {
    client: Client,
    origin: Url,
    max_body_bytes: usize,
}

impl ProxyState {
    pub fn new(origin: Url, timeout: Duration, max_body_bytes: u64) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("vetrina-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| InfraError::configuration(format!("proxy client: {err}")))?;
        Ok(Self::with_client(client, origin, max_body_bytes))
    }

    pub fn with_client(client: Client, origin: Url, max_body_bytes: u64) -> Self {
        Self {
            client,
            origin,
            max_body_bytes: usize::try_from(max_body_bytes).unwrap_or(usize::MAX),
        }
    }

    /// Backend URL for an inbound request URI.
    pub fn target(&self, uri: &Uri) -> Result<Url, url::ParseError> {
        let mut url = self.origin.join(uri.path().trim_start_matches('/'))?;
        url.set_query(uri.query());
        Ok(url)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn proxy_failure(status: StatusCode, public: &'static str, detail: impl Into<String>) -> Response {
    counter!(METRIC_PROXY_FAILURE).increment(1);
    HttpError::new(SOURCE, status, public, detail).into_response()
}

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn forward(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let target = match state.target(&parts.uri) {
        Ok(target) => target,
        Err(err) => {
            return proxy_failure(StatusCode::BAD_REQUEST, "Invalid backend path", err.to_string());
        }
    };

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return proxy_failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request body too large",
                err.to_string(),
            );
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let upstream = state
        .client
        .request(parts.method, target.clone())
        .headers(headers)
        .body(body)
        .send()
        .await;
    let upstream = match upstream {
        Ok(upstream) => upstream,
        Err(err) => {
            return proxy_failure(
                StatusCode::BAD_GATEWAY,
                "Backend unavailable",
                format!("{target}: {err}"),
            );
        }
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            return proxy_failure(
                StatusCode::BAD_GATEWAY,
                "Backend response interrupted",
                err.to_string(),
            );
        }
    };
    debug!(target = "vetrina::proxy", status = status.as_u16(), "proxied");

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

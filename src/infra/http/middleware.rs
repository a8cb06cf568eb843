use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{error::ErrorReport, storefront::RenderTrace},
    cache::CacheDisposition,
};

#[derive(Clone)]
pub struct RequestTrace {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let trace = RequestTrace {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(trace.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(trace);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestTrace>()
        .map(|trace| trace.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    let outcome = response
        .extensions()
        .get::<RenderTrace>()
        .map(|trace| trace.outcome)
        .unwrap_or("-");
    let cache = response
        .extensions()
        .get::<CacheDisposition>()
        .map(|disposition| disposition.as_str())
        .unwrap_or("-");

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "vetrina::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                outcome = outcome,
                cache = cache,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "vetrina::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                outcome = outcome,
                cache = cache,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    } else if outcome != "-" || cache != "-" {
        info!(
            target = "vetrina::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            outcome = outcome,
            cache = cache,
            request_id = request_id,
            "page served",
        );
    }

    response
}

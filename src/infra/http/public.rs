use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    application::error::HttpError,
    cache::response_cache_layer,
    infra::assets::{is_static_path, serve_static},
};

use super::{
    HttpState,
    proxy::{forward, is_proxied_path},
};

/// Send backend paths to the proxy and asset paths to the static directory;
/// everything else is a page render behind the response cache.
pub(super) async fn dispatch(
    State(state): State<HttpState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if is_proxied_path(path) {
        return forward(State(state.proxy.clone()), request).await;
    }
    if is_static_path(path) && matches!(*request.method(), Method::GET | Method::HEAD) {
        let uri = request.uri().clone();
        return serve_static(State(state.files.clone()), uri).await;
    }
    response_cache_layer(State(state.cache.clone()), request, next).await
}

pub(super) async fn render_page(
    State(state): State<HttpState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if !matches!(method, Method::GET | Method::HEAD) {
        return HttpError::new(
            "infra::http::public::render_page",
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            format!("{method} is not supported for storefront pages"),
        )
        .into_response();
    }
    state.storefront.render(&headers, uri.path()).await.into_response()
}

pub(super) async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

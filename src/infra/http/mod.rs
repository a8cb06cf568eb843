//! HTTP surface: backend proxy, static files and the render route, behind
//! gzip response compression.

mod middleware;
mod proxy;
mod public;

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};
use tower_http::compression::CompressionLayer;

pub use middleware::RequestTrace;
pub use proxy::{PROXIED_PREFIXES, ProxyState, is_proxied_path};

use crate::{
    application::storefront::StorefrontService, cache::CacheState, infra::assets::StaticFiles,
};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub storefront: Arc<StorefrontService>,
    pub proxy: ProxyState,
    pub files: StaticFiles,
    pub cache: CacheState,
}

pub fn build_router(state: HttpState) -> Router {
    let storefront = Router::new()
        .fallback(public::render_page)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            public::dispatch,
        ))
        .with_state(state);

    Router::new()
        .route("/_health", get(public::health))
        .fallback_service(storefront)
        .layer(CompressionLayer::new())
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

mod common;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
    routing::post,
};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use vetrina::{
    application::storefront::{RenderTrace, StorefrontService},
    cache::{CacheDisposition, CacheState, ResponseCache, ResponseCacheConfig},
    graphql::stages::RetryPolicy,
    infra::{
        assets::StaticFiles,
        http::{HttpState, ProxyState, build_router},
        shell::DocumentShell,
    },
    persistence::{ContextDefaults, DEFAULT_NAMESPACE},
    presentation::views::OutcomeRenderer,
};

use common::{ScriptedTransport, category_route, cms_route, redirect_route, views};

const BODY_LIMIT: usize = 1024 * 1024;

struct Harness {
    router: Router,
    transport: Arc<ScriptedTransport>,
    _static_dir: TempDir,
}

fn harness_with_origin(origin: Url) -> Harness {
    harness_with(origin, ContextDefaults::default())
}

fn harness_with(origin: Url, defaults: ContextDefaults) -> Harness {
    let transport = ScriptedTransport::routes(vec![
        ("/about-us", cms_route("about-us")),
        ("/shoes.html", category_route("MTI=", "shoes.html")),
        ("/old-shoes.html", redirect_route(301, "shoes.html")),
        ("/sale", redirect_route(302, "/promotions")),
    ]);

    let static_dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(static_dir.path().join("static")).expect("mkdir");
    std::fs::write(static_dir.path().join("static/site.css"), "body{}").expect("write css");
    std::fs::write(static_dir.path().join("robots.txt"), "User-agent: *").expect("write robots");

    let storefront = StorefrontService::new(
        transport.as_transport(),
        views(),
        Arc::new(OutcomeRenderer::default()),
        DocumentShell::builtin(),
        RetryPolicy::default(),
        defaults,
        DEFAULT_NAMESPACE,
    );
    let state = HttpState {
        storefront: Arc::new(storefront),
        proxy: ProxyState::new(origin, Duration::from_secs(5), 1024).expect("proxy"),
        files: StaticFiles::new(static_dir.path()),
        cache: CacheState {
            cache: ResponseCache::new(&ResponseCacheConfig::default()),
            namespace: Arc::from(DEFAULT_NAMESPACE),
        },
    };

    Harness {
        router: build_router(state),
        transport,
        _static_dir: static_dir,
    }
}

fn harness() -> Harness {
    harness_with_origin(Url::parse("http://127.0.0.1:9/").expect("origin"))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("router response")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn found_pages_render_once_and_then_come_from_cache() {
    let harness = harness();

    let first = send(&harness.router, get("/about-us")).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_text(first).await;
    assert!(first_body.contains(r#"<div id="root">"#));
    assert!(first_body.contains("initial-route-data"));

    let second = send(&harness.router, get("/about-us")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_text(second).await, first_body);
    assert_eq!(harness.transport.calls(), 1);
}

#[tokio::test]
async fn visitors_with_different_stored_state_get_separate_renders() {
    let harness = harness();
    let french = r#"M2_VENIA_BROWSER_PERSISTENCE__store_view_code={"value":"\"fr\"","timeStored":1}"#;

    let plain = send(&harness.router, get("/shoes.html")).await;
    assert_eq!(plain.status(), StatusCode::OK);

    let request = Request::builder()
        .uri("/shoes.html")
        .header(header::COOKIE, french)
        .body(Body::empty())
        .expect("request");
    let localized = send(&harness.router, request).await;
    assert_eq!(localized.status(), StatusCode::OK);

    assert_eq!(harness.transport.calls(), 2);
    let stores: Vec<_> = harness
        .transport
        .requests()
        .iter()
        .filter_map(|request| request.headers.get("store").cloned())
        .collect();
    assert_eq!(stores, vec!["default", "fr"]);
}

#[tokio::test]
async fn unknown_routes_are_404_and_not_cached() {
    let harness = harness();

    for _ in 0..2 {
        let response = send(&harness.router, get("/nowhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_text(response).await;
        assert!(!body.contains("initial-route-data"));
    }
    assert_eq!(harness.transport.calls(), 2);
}

#[tokio::test]
async fn redirects_carry_location_and_permanence() {
    let harness = harness();

    let moved = send(&harness.router, get("/old-shoes.html")).await;
    assert_eq!(moved.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(moved.headers()[header::LOCATION], "/shoes.html");

    let temporary = send(&harness.router, get("/sale")).await;
    assert_eq!(temporary.status(), StatusCode::FOUND);
    assert_eq!(temporary.headers()[header::LOCATION], "/promotions");
}

#[tokio::test]
async fn page_routes_reject_writes() {
    let harness = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/about-us")
        .body(Body::empty())
        .expect("request");

    let response = send(&harness.router, request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn health_check_answers_without_rendering() {
    let harness = harness();
    let response = send(&harness.router, get("/_health")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn static_files_bypass_the_render_pipeline() {
    let harness = harness();

    let css = send(&harness.router, get("/static/site.css")).await;
    assert_eq!(css.status(), StatusCode::OK);
    assert_eq!(css.headers()[header::CONTENT_TYPE], "text/css");
    assert_eq!(body_text(css).await, "body{}");

    let robots = send(&harness.router, get("/robots.txt")).await;
    assert_eq!(robots.status(), StatusCode::OK);

    let missing = send(&harness.router, get("/static/missing.js")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn backend_paths_are_forwarded_to_the_origin() {
    let backend = Router::new().route(
        "/graphql",
        post(|body: String| async move { format!("echo:{body}") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind backend");
    let addr = listener.local_addr().expect("backend addr");
    tokio::spawn(async move {
        axum::serve(listener, backend).await.expect("backend server");
    });

    let harness = harness_with_origin(Url::parse(&format!("http://{addr}/")).expect("origin"));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql?op=cart")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query":"{cart}"}"#))
        .expect("request");

    let response = send(&harness.router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"echo:{"query":"{cart}"}"#);
    assert_eq!(harness.transport.calls(), 0);
}

#[tokio::test]
async fn oversized_proxy_bodies_are_rejected() {
    let harness = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .body(Body::from(vec![b'x'; 4096]))
        .expect("request");

    let response = send(&harness.router, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn pages_are_gzipped_when_the_client_accepts_it() {
    let harness = harness();

    let request = Request::builder()
        .uri("/about-us")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .expect("request");
    let compressed = send(&harness.router, request).await;
    assert_eq!(compressed.status(), StatusCode::OK);
    assert_eq!(compressed.headers()[header::CONTENT_ENCODING], "gzip");

    let plain = send(&harness.router, get("/about-us")).await;
    assert!(plain.headers().get(header::CONTENT_ENCODING).is_none());
    assert!(body_text(plain).await.contains(r#"<div id="root">"#));
}

#[tokio::test]
async fn responses_record_route_outcome_and_cache_use() {
    let harness = harness();

    let first = send(&harness.router, get("/about-us")).await;
    assert_eq!(
        first.extensions().get::<RenderTrace>().map(|trace| trace.outcome),
        Some("found")
    );
    assert_eq!(
        first.extensions().get::<CacheDisposition>(),
        Some(&CacheDisposition::Miss)
    );

    let second = send(&harness.router, get("/about-us")).await;
    assert_eq!(
        second.extensions().get::<CacheDisposition>(),
        Some(&CacheDisposition::Hit)
    );

    let missing = send(&harness.router, get("/nowhere")).await;
    assert_eq!(
        missing.extensions().get::<RenderTrace>().map(|trace| trace.outcome),
        Some("not_found")
    );
}

#[tokio::test]
async fn store_code_prefix_selects_the_store_and_is_kept_on_redirects() {
    let defaults = ContextDefaults {
        url_store_codes: vec![Arc::from("default"), Arc::from("fr")].into(),
        ..ContextDefaults::default()
    };
    let harness = harness_with(Url::parse("http://127.0.0.1:9/").expect("origin"), defaults);

    let page = send(&harness.router, get("/fr/about-us")).await;
    assert_eq!(page.status(), StatusCode::OK);

    let moved = send(&harness.router, get("/fr/old-shoes.html")).await;
    assert_eq!(moved.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(moved.headers()[header::LOCATION], "/fr/shoes.html");

    let unprefixed = send(&harness.router, get("/about-us")).await;
    assert_eq!(unprefixed.status(), StatusCode::OK);

    let requests = harness.transport.requests();
    let urls: Vec<_> = requests
        .iter()
        .map(|request| request.operation.variables["url"].clone())
        .collect();
    assert_eq!(urls, vec!["/about-us", "/old-shoes.html", "/about-us"]);
    let stores: Vec<_> = requests
        .iter()
        .filter_map(|request| request.headers.get("store").cloned())
        .collect();
    assert_eq!(stores, vec!["fr", "fr", "default"]);
}

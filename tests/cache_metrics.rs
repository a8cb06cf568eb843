mod common;

use std::{collections::HashSet, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use metrics_util::debugging::DebuggingRecorder;
use tower::ServiceExt;
use url::Url;
use vetrina::{
    application::storefront::StorefrontService,
    cache::{
        CacheFingerprint, CacheState, CachedPage, PageStore, PageStoreError, ResponseCache,
        ResponseCacheConfig, fingerprint,
    },
    graphql::stages::RetryPolicy,
    infra::{
        assets::StaticFiles,
        http::{HttpState, ProxyState, build_router},
        shell::DocumentShell,
    },
    persistence::{ContextDefaults, DEFAULT_NAMESPACE},
    presentation::views::OutcomeRenderer,
};

use common::{ScriptedTransport, cms_route, views};

struct UnavailableStore;

impl PageStore for UnavailableStore {
    fn get(&self, _: &CacheFingerprint) -> Result<Option<CachedPage>, PageStoreError> {
        Err(PageStoreError::Unavailable("store offline".into()))
    }

    fn put(&self, _: CacheFingerprint, _: CachedPage) -> Result<(), PageStoreError> {
        Err(PageStoreError::Unavailable("store offline".into()))
    }

    fn remove(&self, _: &CacheFingerprint) -> Result<(), PageStoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn storefront_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let transport = ScriptedTransport::routes(vec![("/about-us", cms_route("about-us"))]);
    let storefront = StorefrontService::new(
        transport.as_transport(),
        views(),
        Arc::new(OutcomeRenderer::default()),
        DocumentShell::builtin(),
        RetryPolicy::default(),
        ContextDefaults::default(),
        DEFAULT_NAMESPACE,
    );
    let static_dir = tempfile::tempdir().expect("tempdir");
    let state = HttpState {
        storefront: Arc::new(storefront),
        proxy: ProxyState::new(
            Url::parse("http://127.0.0.1:9/").expect("origin"),
            Duration::from_secs(2),
            1024,
        )
        .expect("proxy"),
        files: StaticFiles::new(static_dir.path()),
        cache: CacheState {
            cache: ResponseCache::new(&ResponseCacheConfig::default()),
            namespace: Arc::from(DEFAULT_NAMESPACE),
        },
    };
    let app = build_router(state);

    for (method, uri) in [
        (Method::GET, "/about-us"),
        (Method::GET, "/about-us"),
        (Method::GET, "/missing"),
        (Method::POST, "/graphql"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_ne!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let offline = ResponseCache::with_store(
        &ResponseCacheConfig::default(),
        Arc::new(UnavailableStore),
    );
    let key = fingerprint("/offline", Vec::<(String, String)>::new());
    assert!(offline.lookup(&key).is_none());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "vetrina_response_cache_hit_total",
        "vetrina_response_cache_miss_total",
        "vetrina_response_cache_store_total",
        "vetrina_response_cache_unavailable_total",
        "vetrina_route_outcome_total",
        "vetrina_render_ms",
        "vetrina_proxy_failure_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

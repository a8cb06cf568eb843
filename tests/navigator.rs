mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;
use vetrina::{
    domain::route::{PageType, RouteOutcome},
    graphql::{
        GraphqlClient, GraphqlReply, GraphqlRequest, PipelineError, QueryCache, Transport,
        stages::{MutationQueueStage, RetryPolicy, standard_pipeline},
    },
    persistence::{ContextDefaults, PersistedStore},
    route::{Navigate, Navigator, RouteCache, RouteResolver},
};

use common::{ScriptedTransport, category_route, data, redirect_route, views};

#[derive(Default)]
struct RecordingEffects {
    targets: Mutex<Vec<String>>,
}

impl RecordingEffects {
    fn targets(&self) -> Vec<String> {
        self.targets.lock().expect("targets").clone()
    }
}

impl Navigate for RecordingEffects {
    fn navigate(&self, target: &str) {
        self.targets.lock().expect("targets").push(target.to_string());
    }
}

fn navigator(transport: Arc<dyn Transport>, effects: Arc<RecordingEffects>) -> Navigator {
    let pipeline = standard_pipeline(
        PersistedStore::in_memory("NS"),
        ContextDefaults::default(),
        RetryPolicy::default(),
        MutationQueueStage::new(),
        transport,
    );
    Navigator::new(
        RouteResolver::new(RouteCache::new(), views()),
        GraphqlClient::new(pipeline, QueryCache::new()),
        effects,
    )
}

#[tokio::test]
async fn redirect_fires_once_per_transition() {
    let transport = ScriptedTransport::routes(vec![("/old", redirect_route(301, "new.html"))]);
    let effects = Arc::new(RecordingEffects::default());
    let navigator = navigator(transport.as_transport(), Arc::clone(&effects));

    let outcome = navigator.navigate("/old").await;
    assert_eq!(
        outcome,
        RouteOutcome::Redirect {
            target: "/new.html".into(),
            permanent: true
        }
    );
    assert_eq!(effects.targets(), vec!["/new.html".to_string()]);

    for _ in 0..3 {
        assert!(matches!(
            navigator.outcome(),
            Some(RouteOutcome::Redirect { .. })
        ));
    }
    assert_eq!(effects.targets().len(), 1);
}

#[tokio::test]
async fn found_routes_are_not_queried_twice() {
    let transport = ScriptedTransport::routes(vec![("/shoes.html", category_route("MTI=", "shoes.html"))]);
    let effects = Arc::new(RecordingEffects::default());
    let navigator = navigator(transport.as_transport(), Arc::clone(&effects));

    let first = navigator.navigate("/shoes.html").await;
    let second = navigator.navigate("/shoes.html?page=2").await;

    assert!(first.is_found());
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert!(effects.targets().is_empty());
}

/// Holds `/slow` until released; every other pathname answers at once.
struct GatedTransport {
    release: Arc<Notify>,
    slow_route: Value,
}

impl GatedTransport {
    fn new(release: &Arc<Notify>, slow_route: Value) -> Arc<Self> {
        Arc::new(Self {
            release: Arc::clone(release),
            slow_route,
        })
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: GraphqlRequest) -> Result<GraphqlReply, PipelineError> {
        let url = request.operation.variables["url"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if url == "/slow" {
            self.release.notified().await;
            return Ok(data(json!({ "route": self.slow_route.clone() })));
        }
        Ok(data(json!({ "route": category_route("Mg==", "fast.html") })))
    }
}

#[tokio::test]
async fn stale_navigation_never_redirects() {
    let release = Arc::new(Notify::new());
    let effects = Arc::new(RecordingEffects::default());
    let navigator = navigator(
        GatedTransport::new(&release, redirect_route(302, "elsewhere")),
        Arc::clone(&effects),
    );

    let slow = {
        let navigator = navigator.clone();
        tokio::spawn(async move { navigator.navigate("/slow").await })
    };
    wait_for_current(&navigator, "/slow").await;

    let fast = navigator.navigate("/fast.html").await;
    assert!(fast.is_found());

    release.notify_one();
    let late = slow.await.expect("join");
    assert!(matches!(late, RouteOutcome::Redirect { .. }));

    assert_eq!(navigator.current().map(|key| key.to_string()).as_deref(), Some("/fast.html"));
    assert!(effects.targets().is_empty());
    assert!(navigator.outcome().expect("current outcome").is_found());
}

#[tokio::test]
async fn shimmer_hint_shows_while_loading_and_clears_on_resolution() {
    let release = Arc::new(Notify::new());
    let navigator = navigator(
        GatedTransport::new(&release, category_route("Mw==", "slow")),
        Arc::new(RecordingEffects::default()),
    );

    let pending = {
        let navigator = navigator.clone();
        tokio::spawn(async move {
            navigator
                .navigate_with_hint("/slow", Some(PageType::Product))
                .await
        })
    };
    wait_for_current(&navigator, "/slow").await;

    assert_eq!(
        navigator.outcome(),
        Some(RouteOutcome::Loading {
            initial: true,
            shimmer: Some(PageType::Product),
        })
    );

    release.notify_one();
    let outcome = pending.await.expect("join");
    assert!(outcome.is_found());
    assert_eq!(navigator.resolver().next_root().get(), None);
    assert!(navigator.resolver().session().has_resolved());
}

async fn wait_for_current(navigator: &Navigator, pathname: &str) {
    while navigator.current().as_ref().map(|key| key.as_str()) != Some(pathname) {
        tokio::task::yield_now().await;
    }
}

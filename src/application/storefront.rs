//! Server render of a storefront page, from cookie jar to finished document.

use std::{sync::Arc, time::Instant};

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
    response::{Html, IntoResponse, Response},
};
use metrics::histogram;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use crate::{
    application::error::ErrorReport,
    domain::route::{RouteKey, RouteOutcome},
    graphql::{
        GraphqlClient, QueryCache, Transport,
        stages::{MutationQueueStage, RetryPolicy, standard_pipeline},
    },
    hydration::{self, SerializedPayload},
    infra::{shell::DocumentShell, telemetry::METRIC_RENDER_MS},
    persistence::{ContextDefaults, CookieStorage, PersistedStore, STORE_CODE_KEY},
    presentation::views::{AppMarkup, PageRenderer},
    route::{RouteCache, RouteResolver, ViewLoader},
};

const SOURCE: &str = "application::storefront::StorefrontService";

/// HTTP status a rendered outcome is served with.
///
/// `Loading` never settles on the server; it is reported as unavailable so
/// the page is not cached.
pub fn outcome_status(outcome: &RouteOutcome) -> StatusCode {
    match outcome {
        RouteOutcome::Found(_) => StatusCode::OK,
        RouteOutcome::NotFound => StatusCode::NOT_FOUND,
        RouteOutcome::Error(_) => StatusCode::BAD_GATEWAY,
        RouteOutcome::Redirect {
            permanent: true, ..
        } => StatusCode::MOVED_PERMANENTLY,
        RouteOutcome::Redirect { .. } => StatusCode::FOUND,
        RouteOutcome::Loading { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// JSON description of an outcome, as printed by `vetrina resolve`.
pub fn describe_outcome(pathname: &RouteKey, outcome: &RouteOutcome) -> Value {
    let detail = match outcome {
        RouteOutcome::Found(found) => json!({ "route": found.to_response() }),
        RouteOutcome::Redirect { target, permanent } => {
            json!({ "target": target, "permanent": permanent })
        }
        RouteOutcome::Error(err) => json!({ "error": err.to_string() }),
        RouteOutcome::Loading { initial, shimmer } => json!({
            "initial": initial,
            "shimmer": shimmer.as_ref().map(|page_type| page_type.as_str()),
        }),
        RouteOutcome::NotFound => json!({}),
    };
    let mut described = json!({
        "pathname": pathname.as_str(),
        "outcome": outcome.kind(),
        "status": outcome_status(outcome).as_u16(),
    });
    if let (Some(target), Value::Object(extra)) = (described.as_object_mut(), detail) {
        target.extend(extra);
    }
    described
}

/// Everything one resolution needs, scoped to a single visitor request.
pub struct RequestSession {
    pub store: PersistedStore,
    pub client: GraphqlClient,
    pub resolver: RouteResolver,
}

/// Outcome of a page render, carried on the response for request logging.
#[derive(Debug, Clone, Copy)]
pub struct RenderTrace {
    pub outcome: &'static str,
}

/// A finished page ready to be sent.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub pathname: RouteKey,
    pub status: StatusCode,
    pub location: Option<String>,
    pub html: String,
    pub outcome: &'static str,
}

impl IntoResponse for RenderedPage {
    fn into_response(self) -> Response {
        let mut response = (self.status, Html(self.html)).into_response();
        if let Some(location) = self.location
            && let Ok(value) = HeaderValue::from_str(&location)
        {
            response.headers_mut().insert(LOCATION, value);
        }
        response.extensions_mut().insert(RenderTrace {
            outcome: self.outcome,
        });
        if self.status.is_client_error() || self.status.is_server_error() {
            ErrorReport::from_message(
                SOURCE,
                self.status,
                format!("route `{}` resolved as {}", self.pathname, self.outcome),
            )
            .attach(&mut response);
        }
        response
    }
}

#[derive(Clone)]
pub struct StorefrontService {
    transport: Arc<dyn Transport>,
    views: Arc<dyn ViewLoader>,
    renderer: Arc<dyn PageRenderer>,
    shell: DocumentShell,
    retry: RetryPolicy,
    defaults: ContextDefaults,
    namespace: Arc<str>,
}

impl StorefrontService {
    pub fn new(
        transport: Arc<dyn Transport>,
        views: Arc<dyn ViewLoader>,
        renderer: Arc<dyn PageRenderer>,
        shell: DocumentShell,
        retry: RetryPolicy,
        defaults: ContextDefaults,
        namespace: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            transport,
            views,
            renderer,
            shell,
            retry,
            defaults,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fresh pipeline, caches and resolver over `store`. Nothing here is
    /// shared with other requests.
    pub fn session(&self, store: PersistedStore) -> RequestSession {
        let pipeline = standard_pipeline(
            store.clone(),
            self.defaults.clone(),
            self.retry.clone(),
            MutationQueueStage::new(),
            Arc::clone(&self.transport),
        );
        RequestSession {
            client: GraphqlClient::new(pipeline, QueryCache::new()),
            resolver: RouteResolver::new(RouteCache::new(), Arc::clone(&self.views)),
            store,
        }
    }

    /// Take a leading store code off `path` and record it as the visitor's
    /// store for this request.
    fn enter_store<'a>(
        &self,
        store: &PersistedStore,
        path: &'a str,
    ) -> (Option<&'a str>, &'a str) {
        let (code, path) = self.defaults.split_store_code(path);
        if let Some(code) = code {
            store.set_item(STORE_CODE_KEY, &json!(code), None);
        }
        (code, path)
    }

    /// Resolve `pathname` for a visitor that carries no stored state.
    pub async fn resolve(&self, pathname: &str) -> (RouteKey, RouteOutcome) {
        let store = PersistedStore::in_memory(Arc::clone(&self.namespace));
        let (_, pathname) = self.enter_store(&store, pathname);
        let session = self.session(store);
        let key = RouteKey::normalize(pathname);
        let outcome = session.resolver.resolve_initial(&session.client, &key).await;
        (key, outcome)
    }

    /// Render the page at `path` for the visitor whose cookies are in
    /// `headers`.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn render(&self, headers: &HeaderMap, path: &str) -> RenderedPage {
        let started = Instant::now();
        let store = PersistedStore::new(
            Arc::clone(&self.namespace),
            Arc::new(CookieStorage::from_headers(headers)),
        );
        let (store_code, path) = self.enter_store(&store, path);
        let session = self.session(store);
        let pathname = RouteKey::normalize(path);

        let outcome = session
            .resolver
            .resolve_initial(&session.client, &pathname)
            .await;
        let page = self.assemble(&session, pathname, &outcome, store_code);

        histogram!(METRIC_RENDER_MS, "outcome" => page.outcome)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        page
    }

    fn assemble(
        &self,
        session: &RequestSession,
        pathname: RouteKey,
        outcome: &RouteOutcome,
        store_code: Option<&str>,
    ) -> RenderedPage {
        let status = outcome_status(outcome);
        let location = match (outcome, store_code) {
            (RouteOutcome::Redirect { target, .. }, Some(code)) => {
                Some(format!("/{code}{target}"))
            }
            (RouteOutcome::Redirect { target, .. }, None) => Some(target.clone()),
            _ => None,
        };

        let payload = outcome
            .is_found()
            .then(|| capture(&pathname, outcome, &session.client))
            .flatten();

        let html = match self.renderer.render(&pathname, outcome) {
            Ok(markup) => self.fill_shell(&markup, payload.as_ref()),
            Err(err) => {
                warn!(
                    target = "vetrina::storefront",
                    error = %err,
                    "outcome rendering failed, serving bare shell"
                );
                self.shell.bare()
            }
        };

        RenderedPage {
            pathname,
            status,
            location,
            html,
            outcome: outcome.kind(),
        }
    }

    fn fill_shell(&self, markup: &AppMarkup, payload: Option<&SerializedPayload>) -> String {
        match self.shell.assemble(markup, payload) {
            Ok(html) => html,
            Err(err) => {
                warn!(
                    target = "vetrina::storefront",
                    error = %err,
                    "document assembly failed, serving bare shell"
                );
                self.shell.bare()
            }
        }
    }
}

fn capture(
    pathname: &RouteKey,
    outcome: &RouteOutcome,
    client: &GraphqlClient,
) -> Option<SerializedPayload> {
    match hydration::capture(pathname, outcome, client.cache().extract()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(
                target = "vetrina::storefront",
                error = %err,
                "hydration capture failed, page will resolve on the client"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::route::{PageType, RouteError};

    #[test]
    fn statuses_follow_outcomes() {
        assert_eq!(outcome_status(&RouteOutcome::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            outcome_status(&RouteOutcome::Redirect {
                target: "/b".into(),
                permanent: true
            }),
            StatusCode::MOVED_PERMANENTLY
        );
        assert_eq!(
            outcome_status(&RouteOutcome::Redirect {
                target: "/b".into(),
                permanent: false
            }),
            StatusCode::FOUND
        );
        assert_eq!(
            outcome_status(&RouteOutcome::Error(RouteError::Network("down".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            outcome_status(&RouteOutcome::Loading {
                initial: true,
                shimmer: Some(PageType::Product)
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn describe_outcome_merges_detail_fields() {
        let described = describe_outcome(
            &RouteKey::normalize("/old"),
            &RouteOutcome::Redirect {
                target: "/new".into(),
                permanent: true,
            },
        );
        assert_eq!(described["outcome"], "redirect");
        assert_eq!(described["status"], 301);
        assert_eq!(described["target"], "/new");
        assert_eq!(described["pathname"], "/old");
    }

    #[test]
    fn redirect_pages_carry_location() {
        let page = RenderedPage {
            pathname: RouteKey::normalize("/old"),
            status: StatusCode::FOUND,
            location: Some("/new".into()),
            html: String::new(),
            outcome: "redirect",
        };
        let response = page.into_response();
        assert_eq!(response.headers()[LOCATION], "/new");
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }
}

//! Client-side navigation driver.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::resolver::{RouteResolver, TypeQuery, TypeQueryState};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::route::{PageType, RouteKey, RouteOutcome};
use crate::graphql::{GraphqlClient, fetch_route};

const SOURCE: &str = "route::navigator";

/// Receiver of redirect side effects.
pub trait Navigate: Send + Sync {
    fn navigate(&self, target: &str);
}

#[derive(Default)]
struct NavigationState {
    current: Option<RouteKey>,
    query: Option<TypeQuery>,
    fired_redirect: Option<(RouteKey, String)>,
}

/// Drives the resolver for a sequence of client navigations.
///
/// Only the latest navigation may update the query state or fire a
/// redirect; results that arrive for a pathname the visitor already left
/// are dropped.
#[derive(Clone)]
pub struct Navigator {
    resolver: RouteResolver,
    client: GraphqlClient,
    effects: Arc<dyn Navigate>,
    state: Arc<RwLock<NavigationState>>,
}

impl Navigator {
    pub fn new(
        resolver: RouteResolver,
        client: GraphqlClient,
        effects: Arc<dyn Navigate>,
    ) -> Self {
        Self {
            resolver,
            client,
            effects,
            state: Arc::new(RwLock::new(NavigationState::default())),
        }
    }

    pub fn resolver(&self) -> &RouteResolver {
        &self.resolver
    }

    pub fn current(&self) -> Option<RouteKey> {
        rw_read(&self.state, SOURCE, "current").current.clone()
    }

    /// Outcome for the current pathname as of now, including `Loading`
    /// while a query is in flight.
    pub fn outcome(&self) -> Option<RouteOutcome> {
        let state = rw_read(&self.state, SOURCE, "outcome");
        let current = state.current.as_ref()?;
        let query = state
            .query
            .clone()
            .unwrap_or_else(|| TypeQuery::not_started(current.clone()));
        Some(self.resolver.resolve(current, &query))
    }

    /// Navigate to `pathname`, optionally hinting the page type it is known
    /// to have so loading states can show a matching skeleton.
    pub async fn navigate_with_hint(
        &self,
        pathname: &str,
        hint: Option<PageType>,
    ) -> RouteOutcome {
        if let Some(hint) = hint {
            self.resolver.next_root().set(hint);
        }
        self.navigate(pathname).await
    }

    pub async fn navigate(&self, pathname: &str) -> RouteOutcome {
        let key = RouteKey::normalize(pathname);
        {
            let mut state = rw_write(&self.state, SOURCE, "navigate.start");
            state.current = Some(key.clone());
            state.query = Some(TypeQuery::in_flight(key.clone()));
            state.fired_redirect = None;
        }

        if let Some(found @ RouteOutcome::Found(_)) = self.resolver.cache().get(&key) {
            debug!(target = "vetrina::route", pathname = %key, "route already resolved");
            self.resolver.next_root().clear();
            self.record(&key, &found);
            return found;
        }

        let fetched = fetch_route(&self.client, &key).await;
        let query = TypeQuery::from_fetch(key.clone(), fetched);

        if !self.commit_query(&key, &query) {
            debug!(target = "vetrina::route", pathname = %key, "dropping stale navigation");
            return self.resolver.resolve(&key, &query);
        }

        if let TypeQueryState::Completed(Some(resolved)) = &query.state
            && resolved.is_usable()
        {
            self.resolver.settle(&key, resolved).await;
        }

        let outcome = self.resolver.resolve(&key, &query);
        self.record(&key, &outcome);
        outcome
    }

    /// Store `query` as the live query if `key` is still the current
    /// pathname. Both happen under one write guard.
    fn commit_query(&self, key: &RouteKey, query: &TypeQuery) -> bool {
        let mut state = rw_write(&self.state, SOURCE, "navigate.query");
        if state.current.as_ref() != Some(key) {
            return false;
        }
        state.query = Some(query.clone());
        true
    }

    /// Fire the redirect side effect once per transition into a redirect,
    /// and only while `key` is still the current pathname.
    fn record(&self, key: &RouteKey, outcome: &RouteOutcome) {
        let target = {
            let mut state = rw_write(&self.state, SOURCE, "record");
            if state.current.as_ref() != Some(key) {
                return;
            }
            match outcome {
                RouteOutcome::Redirect { target, .. } => {
                    let transition = (key.clone(), target.clone());
                    if state.fired_redirect.as_ref() == Some(&transition) {
                        return;
                    }
                    state.fired_redirect = Some(transition);
                    target.clone()
                }
                _ => {
                    state.fired_redirect = None;
                    return;
                }
            }
        };

        info!(target = "vetrina::route", from = %key, to = %target, "following redirect");
        self.effects.navigate(&target);
    }
}

//! The route-resolution state machine.
//!
//! [`RouteResolver::resolve`] is a pure classification over the route cache
//! and the current type-query state. [`RouteResolver::settle`] performs the
//! one asynchronous step: acquiring the view for a freshly resolved page and
//! committing the outcome to the cache.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::{cache::RouteCache, views::ViewLoader};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::route::{
    FoundRoute, PageType, ResolvedUrl, RouteError, RouteIdentifier, RouteKey, RouteOutcome,
};
use crate::graphql::{FetchError, GraphqlClient, fetch_route};

const SOURCE: &str = "route::resolver";
const METRIC_OUTCOME: &str = "vetrina_route_outcome_total";

/// Progress of the type-resolution query for one pathname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeQueryState {
    NotStarted,
    InFlight,
    Failed(RouteError),
    Completed(Option<ResolvedUrl>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeQuery {
    pub pathname: RouteKey,
    pub state: TypeQueryState,
}

impl TypeQuery {
    pub fn not_started(pathname: RouteKey) -> Self {
        Self {
            pathname,
            state: TypeQueryState::NotStarted,
        }
    }

    pub fn in_flight(pathname: RouteKey) -> Self {
        Self {
            pathname,
            state: TypeQueryState::InFlight,
        }
    }

    pub fn failed(pathname: RouteKey, error: RouteError) -> Self {
        Self {
            pathname,
            state: TypeQueryState::Failed(error),
        }
    }

    pub fn completed(pathname: RouteKey, resolved: Option<ResolvedUrl>) -> Self {
        Self {
            pathname,
            state: TypeQueryState::Completed(resolved),
        }
    }

    /// Settle a query from a fetch result.
    pub fn from_fetch(
        pathname: RouteKey,
        result: Result<Option<vetrina_types::RouteResponse>, FetchError>,
    ) -> Self {
        match result {
            Ok(route) => Self::completed(pathname, route.as_ref().map(ResolvedUrl::from)),
            Err(err) => Self::failed(pathname, route_error(&err)),
        }
    }
}

fn route_error(err: &FetchError) -> RouteError {
    if err.is_network() {
        RouteError::Network(err.to_string())
    } else {
        RouteError::Resolution(err.to_string())
    }
}

/// Page type of a navigation already underway, used to pick a skeleton.
#[derive(Clone, Default)]
pub struct NextRootHint {
    slot: Arc<RwLock<Option<PageType>>>,
}

impl NextRootHint {
    pub fn set(&self, page_type: PageType) {
        *rw_write(&self.slot, SOURCE, "hint.set") = Some(page_type);
    }

    pub fn get(&self) -> Option<PageType> {
        rw_read(&self.slot, SOURCE, "hint.get").clone()
    }

    pub fn clear(&self) {
        *rw_write(&self.slot, SOURCE, "hint.clear") = None;
    }
}

/// Per-session facts that survive individual resolutions.
#[derive(Clone, Default)]
pub struct SessionFlags {
    resolved_once: Arc<AtomicBool>,
}

impl SessionFlags {
    pub fn mark_resolved(&self) {
        self.resolved_once.store(true, Ordering::Release);
    }

    pub fn has_resolved(&self) -> bool {
        self.resolved_once.load(Ordering::Acquire)
    }
}

type AcquisitionKey = (RouteKey, PageType, RouteIdentifier);

/// Acquisitions that are running or have committed.
///
/// An entry marked committed is permanent; a running entry is removed if its
/// guard is dropped without committing, so a cancelled acquisition can be
/// retried.
#[derive(Clone, Default)]
struct Acquisitions {
    entries: Arc<DashMap<AcquisitionKey, bool>>,
}

impl Acquisitions {
    fn begin(&self, key: AcquisitionKey) -> Option<AcquisitionGuard> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(false);
                Some(AcquisitionGuard {
                    key,
                    entries: Arc::clone(&self.entries),
                    committed: false,
                })
            }
            Entry::Occupied(_) => None,
        }
    }
}

struct AcquisitionGuard {
    key: AcquisitionKey,
    entries: Arc<DashMap<AcquisitionKey, bool>>,
    committed: bool,
}

impl AcquisitionGuard {
    fn commit(mut self) {
        self.entries.insert(self.key.clone(), true);
        self.committed = true;
    }
}

impl Drop for AcquisitionGuard {
    fn drop(&mut self) {
        if !self.committed {
            self.entries.remove(&self.key);
        }
    }
}

/// Route resolution for one session or one server request.
#[derive(Clone)]
pub struct RouteResolver {
    cache: RouteCache,
    views: Arc<dyn ViewLoader>,
    acquisitions: Acquisitions,
    next_root: NextRootHint,
    session: SessionFlags,
}

impl RouteResolver {
    pub fn new(cache: RouteCache, views: Arc<dyn ViewLoader>) -> Self {
        Self {
            cache,
            views,
            acquisitions: Acquisitions::default(),
            next_root: NextRootHint::default(),
            session: SessionFlags::default(),
        }
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    pub fn views(&self) -> &Arc<dyn ViewLoader> {
        &self.views
    }

    pub fn next_root(&self) -> &NextRootHint {
        &self.next_root
    }

    pub fn session(&self) -> &SessionFlags {
        &self.session
    }

    /// Classify `pathname` given the current state of its type query.
    ///
    /// Rules apply in priority order: a cached `Found`, then errors, then a
    /// redirect, then not-found, then loading. A query issued for a
    /// different pathname is a late completion and counts as not started.
    pub fn resolve(&self, pathname: &RouteKey, query: &TypeQuery) -> RouteOutcome {
        if let Some(outcome @ (RouteOutcome::Found(_) | RouteOutcome::Error(_))) =
            self.cache.get(pathname)
        {
            return outcome;
        }

        let state = (&query.pathname == pathname).then_some(&query.state);
        match state {
            Some(TypeQueryState::Failed(err)) => return RouteOutcome::Error(err.clone()),
            Some(TypeQueryState::Completed(Some(resolved))) => {
                if let Some(redirect) = &resolved.redirect {
                    return RouteOutcome::Redirect {
                        target: redirect.target.clone(),
                        permanent: redirect.is_permanent(),
                    };
                }
                if resolved.is_empty() {
                    return RouteOutcome::NotFound;
                }
            }
            Some(TypeQueryState::Completed(None)) => return RouteOutcome::NotFound,
            Some(TypeQueryState::NotStarted | TypeQueryState::InFlight) | None => {}
        }

        RouteOutcome::Loading {
            initial: !self.session.has_resolved(),
            shimmer: self.next_root.get(),
        }
    }

    /// Acquire the view for a usable, non-redirect resolution and commit the
    /// result to the route cache.
    ///
    /// Runs at most once per `(pathname, type, identifier)`: concurrent
    /// callers for the same triple return `None` while the first one works,
    /// and later callers get the committed outcome back without loading.
    #[instrument(skip_all, fields(pathname = %pathname))]
    pub async fn settle(
        &self,
        pathname: &RouteKey,
        resolved: &ResolvedUrl,
    ) -> Option<RouteOutcome> {
        if resolved.redirect.is_some() {
            return None;
        }
        let (Some(page_type), Some(source)) = (resolved.page_type.clone(), resolved.source_data())
        else {
            return None;
        };

        let key = (pathname.clone(), page_type.clone(), source.identifier.clone());
        if let Some(RouteOutcome::Found(found)) = self.cache.get(pathname)
            && found.page_type == page_type
            && found.source.identifier == source.identifier
        {
            return Some(RouteOutcome::Found(found));
        }

        let Some(guard) = self.acquisitions.begin(key) else {
            debug!(target = "vetrina::route", "acquisition already handled");
            return self.cache.get(pathname);
        };

        let outcome = match self.views.load(&page_type).await {
            Ok(view) => RouteOutcome::Found(FoundRoute {
                view,
                page_type,
                source,
            }),
            Err(err) => {
                warn!(target = "vetrina::route", error = %err, "view lookup failed");
                RouteOutcome::Error(RouteError::Resolution(err.to_string()))
            }
        };

        self.cache.insert(pathname.clone(), outcome.clone());
        guard.commit();
        if outcome.is_found() {
            self.session.mark_resolved();
            self.next_root.clear();
        }
        Some(outcome)
    }

    /// Server-side resolution of the first page: type query, settle, classify.
    #[instrument(skip_all, fields(pathname = %pathname))]
    pub async fn resolve_initial(
        &self,
        client: &GraphqlClient,
        pathname: &RouteKey,
    ) -> RouteOutcome {
        if let Some(found @ RouteOutcome::Found(_)) = self.cache.get(pathname) {
            return found;
        }

        let fetched = fetch_route(client, pathname).await;
        let query = TypeQuery::from_fetch(pathname.clone(), fetched);
        if let TypeQueryState::Completed(Some(resolved)) = &query.state
            && resolved.is_usable()
        {
            self.settle(pathname, resolved).await;
        }

        let outcome = self.resolve(pathname, &query);
        counter!(METRIC_OUTCOME, "outcome" => outcome.kind()).increment(1);
        debug!(target = "vetrina::route", outcome = outcome.kind(), "route resolved");
        outcome
    }
}

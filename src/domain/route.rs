//! Route resolution vocabulary shared by the server render path and hydrating
//! clients.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vetrina_types::RouteResponse;

use super::error::DomainError;

/// Normalized pathname used as the route cache key.
///
/// Query strings and fragments are dropped, the path always starts with a
/// single `/`, repeated slashes collapse and a trailing slash is removed for
/// every path except the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct RouteKey(String);

impl RouteKey {
    pub fn normalize(raw: &str) -> Self {
        let path = raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let mut normalized = String::with_capacity(path.len() + 1);
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            normalized.push('/');
            normalized.push_str(segment);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }

        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RouteKey {
    fn from(value: String) -> Self {
        Self::normalize(&value)
    }
}

impl From<&str> for RouteKey {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

impl From<RouteKey> for String {
    fn from(value: RouteKey) -> Self {
        value.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page type tag reported by the type-resolution query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PageType {
    Product,
    Category,
    CmsPage,
    Other(String),
}

impl PageType {
    pub fn as_str(&self) -> &str {
        match self {
            PageType::Product => "PRODUCT",
            PageType::Category => "CATEGORY",
            PageType::CmsPage => "CMS_PAGE",
            PageType::Other(tag) => tag.as_str(),
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            "PRODUCT" => PageType::Product,
            "CATEGORY" => PageType::Category,
            "CMS_PAGE" => PageType::CmsPage,
            other => PageType::Other(other.to_string()),
        }
    }
}

impl From<String> for PageType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<PageType> for String {
    fn from(value: PageType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one identifying field of a resolved page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteIdentifier {
    Id(i64),
    Identifier(String),
    Uid(String),
}

impl RouteIdentifier {
    /// Pick the identifying field from a raw route response.
    ///
    /// Backends occasionally return more than one; `uid` wins over
    /// `identifier`, which wins over the legacy numeric `id`.
    pub fn from_response(route: &RouteResponse) -> Option<Self> {
        if let Some(uid) = route.uid.as_ref().filter(|uid| !uid.is_empty()) {
            return Some(Self::Uid(uid.clone()));
        }
        if let Some(identifier) = route.identifier.as_ref().filter(|id| !id.is_empty()) {
            return Some(Self::Identifier(identifier.clone()));
        }
        route.id.filter(|id| *id != 0).map(Self::Id)
    }

    /// Write this identifier back into its wire slot.
    pub fn apply_to(&self, route: &mut RouteResponse) {
        match self {
            RouteIdentifier::Id(id) => route.id = Some(*id),
            RouteIdentifier::Identifier(identifier) => route.identifier = Some(identifier.clone()),
            RouteIdentifier::Uid(uid) => route.uid = Some(uid.clone()),
        }
    }
}

impl fmt::Display for RouteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteIdentifier::Id(id) => write!(f, "id:{id}"),
            RouteIdentifier::Identifier(identifier) => write!(f, "identifier:{identifier}"),
            RouteIdentifier::Uid(uid) => write!(f, "uid:{uid}"),
        }
    }
}

/// Redirect instruction carried by a type-resolution response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub code: u16,
    pub target: String,
}

impl Redirect {
    pub fn is_redirect(code: u16) -> bool {
        matches!(code, 301 | 302)
    }

    /// Build a redirect when `code` is redirect-class. Targets without a
    /// leading slash are made absolute-path.
    pub fn from_parts(code: Option<u16>, relative_url: Option<&str>) -> Option<Self> {
        let code = code.filter(|code| Self::is_redirect(*code))?;
        let relative = relative_url.unwrap_or_default();
        let target = if relative.starts_with('/') {
            relative.to_string()
        } else {
            format!("/{relative}")
        };
        Some(Self { code, target })
    }

    pub fn is_permanent(&self) -> bool {
        self.code == 301
    }
}

/// Typed view of a type-resolution response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub page_type: Option<PageType>,
    pub identifier: Option<RouteIdentifier>,
    pub redirect: Option<Redirect>,
    pub relative_url: Option<String>,
    pub redirect_code: Option<u16>,
}

impl ResolvedUrl {
    /// True when both a page type and an identifying field are present.
    pub fn is_usable(&self) -> bool {
        self.page_type.is_some() && self.identifier.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_usable()
    }

    pub fn source_data(&self) -> Option<SourceData> {
        Some(SourceData {
            identifier: self.identifier.clone()?,
            relative_url: self.relative_url.clone(),
            redirect_code: self.redirect_code,
        })
    }
}

impl From<&RouteResponse> for ResolvedUrl {
    fn from(route: &RouteResponse) -> Self {
        Self {
            page_type: route
                .page_type
                .as_deref()
                .filter(|tag| !tag.is_empty())
                .map(PageType::parse),
            identifier: RouteIdentifier::from_response(route),
            redirect: Redirect::from_parts(route.redirect_code, route.relative_url.as_deref()),
            relative_url: route.relative_url.clone(),
            redirect_code: route.redirect_code,
        }
    }
}

/// Type-specific data needed to render a resolved page without re-querying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceData {
    pub identifier: RouteIdentifier,
    pub relative_url: Option<String>,
    pub redirect_code: Option<u16>,
}

/// Opaque handle to the renderable bundle for a page type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDescriptor {
    page_type: PageType,
    bundle: Arc<str>,
}

impl ViewDescriptor {
    pub fn new(page_type: PageType, bundle: impl Into<Arc<str>>) -> Self {
        Self {
            page_type,
            bundle: bundle.into(),
        }
    }

    pub fn page_type(&self) -> &PageType {
        &self.page_type
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }
}

/// Successfully resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundRoute {
    pub view: ViewDescriptor,
    pub page_type: PageType,
    pub source: SourceData,
}

impl FoundRoute {
    /// Raw wire form used when the route crosses the hydration boundary.
    pub fn to_response(&self) -> RouteResponse {
        let mut route = RouteResponse {
            page_type: Some(self.page_type.as_str().to_string()),
            relative_url: self.source.relative_url.clone(),
            redirect_code: self.source.redirect_code,
            ..Default::default()
        };
        self.source.identifier.apply_to(&mut route);
        route
    }
}

/// Why a route could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("resolution failure: {0}")]
    Resolution(String),
}

/// Classified result of resolving a pathname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Found(FoundRoute),
    Redirect { target: String, permanent: bool },
    NotFound,
    Error(RouteError),
    Loading {
        initial: bool,
        shimmer: Option<PageType>,
    },
}

impl RouteOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            RouteOutcome::Found(_) => "found",
            RouteOutcome::Redirect { .. } => "redirect",
            RouteOutcome::NotFound => "not_found",
            RouteOutcome::Error(_) => "error",
            RouteOutcome::Loading { .. } => "loading",
        }
    }

    pub fn as_found(&self) -> Option<&FoundRoute> {
        match self {
            RouteOutcome::Found(found) => Some(found),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, RouteOutcome::Found(_))
    }
}

/// Reject hydration records whose identifying field does not match the wire
/// rules before they are promoted to a `Found` outcome.
pub fn require_identifier(route: &RouteResponse) -> Result<RouteIdentifier, DomainError> {
    RouteIdentifier::from_response(route)
        .ok_or_else(|| DomainError::invariant("resolved route carries no identifying field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_applies_slash_policy() {
        assert_eq!(RouteKey::normalize("").as_str(), "/");
        assert_eq!(RouteKey::normalize("/").as_str(), "/");
        assert_eq!(RouteKey::normalize("shoes.html").as_str(), "/shoes.html");
        assert_eq!(RouteKey::normalize("/women//tops/").as_str(), "/women/tops");
        assert_eq!(
            RouteKey::normalize("/shoes.html?color=red#top").as_str(),
            "/shoes.html"
        );
    }

    #[test]
    fn page_type_round_trips_unknown_tags() {
        assert_eq!(PageType::parse("CMS_PAGE"), PageType::CmsPage);
        let other = PageType::parse("BLOG_POST");
        assert_eq!(other.as_str(), "BLOG_POST");
        assert_eq!(String::from(other), "BLOG_POST");
    }

    #[test]
    fn identifier_precedence_prefers_uid() {
        let route = RouteResponse {
            id: Some(12),
            uid: Some("MTI=".into()),
            ..Default::default()
        };
        assert_eq!(
            RouteIdentifier::from_response(&route),
            Some(RouteIdentifier::Uid("MTI=".into()))
        );

        let empty = RouteResponse::default();
        assert_eq!(RouteIdentifier::from_response(&empty), None);
    }

    #[test]
    fn redirect_target_is_made_absolute() {
        let redirect = Redirect::from_parts(Some(301), Some("new-shoes.html")).expect("redirect");
        assert_eq!(redirect.target, "/new-shoes.html");
        assert!(redirect.is_permanent());

        assert!(Redirect::from_parts(Some(0), Some("x")).is_none());
        assert!(Redirect::from_parts(None, Some("x")).is_none());
    }

    #[test]
    fn found_route_writes_single_identifier() {
        let found = FoundRoute {
            view: ViewDescriptor::new(PageType::CmsPage, "cms"),
            page_type: PageType::CmsPage,
            source: SourceData {
                identifier: RouteIdentifier::Identifier("home".into()),
                relative_url: Some("home".into()),
                redirect_code: Some(0),
            },
        };
        let wire = found.to_response();
        assert_eq!(wire.identifier.as_deref(), Some("home"));
        assert!(wire.id.is_none());
        assert!(wire.uid.is_none());
        assert_eq!(wire.page_type.as_deref(), Some("CMS_PAGE"));
    }
}

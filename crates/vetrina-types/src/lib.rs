//! Wire types exchanged between the vetrina server, the GraphQL backend and
//! hydrating clients.
//!
//! Everything here is plain serde data. Validation and typed views live in the
//! `vetrina` crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Element id of the inline script that carries the hydration payload.
pub const HYDRATION_ELEMENT_ID: &str = "initial-route-data";

/// Raw `route(url:)` response as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_url: Option<String>,
}

/// Envelope of the `resolveUrl` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteQueryData {
    #[serde(default)]
    pub route: Option<RouteResponse>,
}

/// One segment of a GraphQL error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

/// A single entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = Some(path);
        self
    }
}

/// A GraphQL response body. Data and errors may both be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphqlError>>,
}

impl GraphqlResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }
}

/// Route portion of the hydration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydratedRoute {
    pub pathname: String,
    #[serde(flatten)]
    pub route: RouteResponse,
}

/// Complete hydration payload embedded in server-rendered documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationDocument {
    pub route: HydratedRoute,
    #[serde(default)]
    pub cache: BTreeMap<String, Value>,
}

use std::sync::Arc;

use super::PersistedStore;

pub const SIGNIN_TOKEN_KEY: &str = "signin_token";
pub const STORE_CODE_KEY: &str = "store_view_code";
pub const STORE_CURRENCY_KEY: &str = "store_view_currency";

/// Deployment fallbacks for visitors that have not chosen a store, and the
/// store codes that may lead a page path.
#[derive(Debug, Clone)]
pub struct ContextDefaults {
    pub store_code: Arc<str>,
    pub url_store_codes: Arc<[Arc<str>]>,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            store_code: Arc::from("default"),
            url_store_codes: Arc::from(Vec::new()),
        }
    }
}

impl ContextDefaults {
    /// Split a known store code off the first segment of `path`.
    ///
    /// Returns the code and the remaining page path, or `(None, path)` when
    /// the first segment is not a configured store code.
    pub fn split_store_code<'a>(&self, path: &'a str) -> (Option<&'a str>, &'a str) {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (segment, rest) = match trimmed.find('/') {
            Some(at) => trimmed.split_at(at),
            None => (trimmed, "/"),
        };
        if !segment.is_empty()
            && self
                .url_store_codes
                .iter()
                .any(|code| code.as_ref() == segment)
        {
            (Some(segment), rest)
        } else {
            (None, path)
        }
    }
}

/// Per-call visitor context attached to outbound GraphQL requests.
///
/// Always derived fresh from the store; sign-in and store switches can land
/// between two calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub auth_token: Option<String>,
    pub store_code: String,
    pub currency: Option<String>,
}

impl RequestContext {
    pub fn from_store(store: &PersistedStore, defaults: &ContextDefaults) -> Self {
        Self {
            auth_token: store.get_string(SIGNIN_TOKEN_KEY),
            store_code: store
                .get_string(STORE_CODE_KEY)
                .unwrap_or_else(|| defaults.store_code.to_string()),
            currency: store.get_string(STORE_CURRENCY_KEY),
        }
    }
}

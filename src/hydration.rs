//! Transfer of a server-resolved route and its query data into the page.
//!
//! The payload is one JSON document inside
//! `<script id="initial-route-data" type="application/json">`:
//!
//! ```text
//! {"route":{"pathname":"/home","type":"CMS_PAGE","identifier":"home",...},"cache":{...}}
//! ```
//!
//! Characters that could end the script element early are written as JSON
//! `\uXXXX` escapes, so the text parses as-is without HTML unescaping.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use lol_html::{RewriteStrSettings, rewrite_str, text};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use vetrina_types::{HYDRATION_ELEMENT_ID, HydratedRoute, HydrationDocument};

use crate::domain::{
    error::DomainError,
    route::{
        FoundRoute, ResolvedUrl, RouteError, RouteKey, RouteOutcome, require_identifier,
    },
};
use crate::graphql::QueryCache;
use crate::route::RouteResolver;

#[derive(Debug, Error)]
pub enum HydrationError {
    #[error("only resolved routes can be captured, got `{0}`")]
    Unresolved(&'static str),
    #[error("payload json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not valid: {0}")]
    Invalid(#[from] DomainError),
}

/// HTML-safe JSON text of a hydration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPayload(String);

impl SerializedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Complete script element carrying the payload.
    pub fn script_tag(&self) -> String {
        format!(
            r#"<script id="{HYDRATION_ELEMENT_ID}" type="application/json">{}</script>"#,
            self.0
        )
    }

    /// Text of the payload script in a rendered document, if there is one.
    pub fn from_document(html: &str) -> Option<Self> {
        let collected = Rc::new(RefCell::new(None::<String>));
        let selector = format!("script#{HYDRATION_ELEMENT_ID}");

        let result = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![text!(selector, {
                    let collected = Rc::clone(&collected);
                    move |chunk| {
                        collected
                            .borrow_mut()
                            .get_or_insert_with(String::new)
                            .push_str(chunk.as_str());
                        Ok(())
                    }
                })],
                ..RewriteStrSettings::default()
            },
        );
        if result.is_err() {
            return None;
        }

        let text = collected.borrow_mut().take()?;
        Some(Self(text))
    }
}

/// One-shot holder for the payload found at startup.
///
/// [`take`](Self::take) moves the payload out; a second consumer sees
/// nothing.
#[derive(Debug, Default)]
pub struct EmbeddedPayload(Option<SerializedPayload>);

impl EmbeddedPayload {
    pub fn new(payload: Option<SerializedPayload>) -> Self {
        Self(payload)
    }

    pub fn from_document(html: &str) -> Self {
        Self(SerializedPayload::from_document(html))
    }

    pub fn take(&mut self) -> Option<SerializedPayload> {
        self.0.take()
    }

    pub fn is_consumed(&self) -> bool {
        self.0.is_none()
    }
}

fn escape_for_html(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Serialize a found route with the query cache that produced it.
pub fn capture(
    pathname: &RouteKey,
    outcome: &RouteOutcome,
    cache: BTreeMap<String, Value>,
) -> Result<SerializedPayload, HydrationError> {
    let found = outcome
        .as_found()
        .ok_or(HydrationError::Unresolved(outcome.kind()))?;

    let document = HydrationDocument {
        route: HydratedRoute {
            pathname: pathname.to_string(),
            route: found.to_response(),
        },
        cache,
    };
    let json = serde_json::to_string(&document)?;
    Ok(SerializedPayload(escape_for_html(&json)))
}

type Decoded = (RouteKey, ResolvedUrl, HydrationDocument);

fn decode(payload: &SerializedPayload) -> Result<Decoded, HydrationError> {
    let document: HydrationDocument = serde_json::from_str(payload.as_str())?;
    require_identifier(&document.route.route)?;
    let resolved = ResolvedUrl::from(&document.route.route);
    if resolved.page_type.is_none() {
        return Err(DomainError::invariant("hydrated route carries no page type").into());
    }
    let key = RouteKey::normalize(&document.route.pathname);
    Ok((key, resolved, document))
}

/// Seed the resolver's route cache and the query cache from the embedded
/// payload.
///
/// Consumes the slot. Returns `None` when there is no payload or it cannot
/// be decoded; decode failures are logged in debug builds only. A restored
/// `Found` route counts as the session's first resolution.
pub async fn restore(
    slot: &mut EmbeddedPayload,
    resolver: &RouteResolver,
    queries: &QueryCache,
) -> Option<(RouteKey, RouteOutcome)> {
    let payload = slot.take()?;

    let (key, resolved, document) = match decode(&payload) {
        Ok(decoded) => decoded,
        Err(err) => {
            if cfg!(debug_assertions) {
                warn!(
                    target = "vetrina::hydration",
                    error = %err,
                    "ignoring hydration payload"
                );
            }
            return None;
        }
    };
    let (Some(page_type), Some(source)) = (resolved.page_type.clone(), resolved.source_data())
    else {
        return None;
    };

    queries.restore(document.cache);

    let outcome = match resolver.views().load(&page_type).await {
        Ok(view) => RouteOutcome::Found(FoundRoute {
            view,
            page_type,
            source,
        }),
        Err(err) => RouteOutcome::Error(RouteError::Resolution(err.to_string())),
    };
    if outcome.is_found() {
        resolver.session().mark_resolved();
    }
    resolver.cache().seed(key.clone(), outcome.clone());
    Some((key, outcome))
}

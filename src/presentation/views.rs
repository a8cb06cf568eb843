//! Server-side markup for each route outcome.
//!
//! The renderer only produces the application markup and the extra head
//! tags; placing them into the document is the shell's job.

use askama::{Error as AskamaError, Template};
use thiserror::Error;

use crate::domain::route::{FoundRoute, RouteError, RouteKey, RouteOutcome};

#[derive(Debug, Error)]
#[error("{public_message} in {source}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

pub fn render_template<T: Template>(template: T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
    })
}

/// Markup produced for one outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppMarkup {
    /// Tags appended to the document `<head>`.
    pub head: String,
    /// Content of the application root element.
    pub body: String,
}

/// UI collaborator turning a classified route into markup.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        pathname: &RouteKey,
        outcome: &RouteOutcome,
    ) -> Result<AppMarkup, TemplateRenderError>;
}

#[derive(Template)]
#[template(path = "head.html")]
struct HeadTemplate<'a> {
    title: &'a str,
    noindex: bool,
    canonical: Option<String>,
}

#[derive(Template)]
#[template(path = "outcome/found.html")]
struct FoundTemplate<'a> {
    pathname: &'a str,
    page_type: &'a str,
    identifier: String,
    bundle: &'a str,
}

#[derive(Template)]
#[template(path = "outcome/not_found.html")]
struct NotFoundTemplate<'a> {
    pathname: &'a str,
}

#[derive(Template)]
#[template(path = "outcome/error.html")]
struct ErrorTemplate {
    cause: &'static str,
}

#[derive(Template)]
#[template(path = "outcome/loading.html")]
struct LoadingTemplate {
    initial: bool,
    shimmer: Option<String>,
}

#[derive(Template)]
#[template(path = "outcome/redirect.html")]
struct RedirectTemplate<'a> {
    target: &'a str,
}

/// Default renderer backed by the bundled askama templates.
#[derive(Debug, Clone)]
pub struct OutcomeRenderer {
    site_name: String,
}

impl Default for OutcomeRenderer {
    fn default() -> Self {
        Self::new("Vetrina")
    }
}

impl OutcomeRenderer {
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
        }
    }

    fn head(
        &self,
        title: &str,
        noindex: bool,
        canonical: Option<String>,
    ) -> Result<String, TemplateRenderError> {
        let title = if title.is_empty() {
            self.site_name.clone()
        } else {
            format!("{title} | {}", self.site_name)
        };
        render_template(HeadTemplate {
            title: &title,
            noindex,
            canonical,
        })
    }

    fn found(
        &self,
        pathname: &RouteKey,
        found: &FoundRoute,
    ) -> Result<AppMarkup, TemplateRenderError> {
        let canonical = found
            .source
            .relative_url
            .as_deref()
            .map(|url| format!("/{}", url.trim_start_matches('/')));
        let body = render_template(FoundTemplate {
            pathname: pathname.as_str(),
            page_type: found.page_type.as_str(),
            identifier: found.source.identifier.to_string(),
            bundle: found.view.bundle(),
        })?;
        Ok(AppMarkup {
            head: self.head("", false, canonical)?,
            body,
        })
    }
}

impl PageRenderer for OutcomeRenderer {
    fn render(
        &self,
        pathname: &RouteKey,
        outcome: &RouteOutcome,
    ) -> Result<AppMarkup, TemplateRenderError> {
        match outcome {
            RouteOutcome::Found(found) => self.found(pathname, found),
            RouteOutcome::NotFound => Ok(AppMarkup {
                head: self.head("Page not found", true, None)?,
                body: render_template(NotFoundTemplate {
                    pathname: pathname.as_str(),
                })?,
            }),
            RouteOutcome::Error(err) => Ok(AppMarkup {
                head: self.head("Error", true, None)?,
                body: render_template(ErrorTemplate {
                    cause: match err {
                        RouteError::Network(_) => "network",
                        RouteError::Resolution(_) => "resolution",
                    },
                })?,
            }),
            RouteOutcome::Redirect { target, .. } => Ok(AppMarkup {
                head: self.head("", true, None)?,
                body: render_template(RedirectTemplate { target })?,
            }),
            RouteOutcome::Loading { initial, shimmer } => Ok(AppMarkup {
                head: self.head("", true, None)?,
                body: render_template(LoadingTemplate {
                    initial: *initial,
                    shimmer: shimmer.as_ref().map(|page_type| page_type.as_str().to_string()),
                })?,
            }),
        }
    }
}

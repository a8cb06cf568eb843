//! Document shell the rendered application is injected into.

use std::{path::Path, sync::Arc};

use lol_html::{
    RewriteStrSettings, element, errors::RewritingError, html_content::ContentType, rewrite_str,
};
use tracing::info;

use crate::hydration::SerializedPayload;
use crate::presentation::views::AppMarkup;

use super::error::InfraError;

const ROOT_SELECTOR: &str = "div#root";

const BUILTIN_SHELL: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<link rel="manifest" href="/manifest.json">
</head>
<body>
<div id="root"></div>
</body>
</html>
"#;

/// The `index.html` every page is assembled from.
#[derive(Debug, Clone)]
pub struct DocumentShell {
    template: Arc<str>,
}

impl Default for DocumentShell {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DocumentShell {
    pub fn builtin() -> Self {
        Self::from_template(BUILTIN_SHELL)
    }

    pub fn from_template(template: impl Into<Arc<str>>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Read the shell from disk, or use the built-in one when no path is set.
    pub async fn load(path: Option<&Path>) -> Result<Self, InfraError> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };
        let template = tokio::fs::read_to_string(path).await?;
        if !template.contains(r#"id="root""#) {
            return Err(InfraError::configuration(format!(
                "document shell `{}` has no root element",
                path.display()
            )));
        }
        info!(target = "vetrina::shell", path = %path.display(), "document shell loaded");
        Ok(Self::from_template(template))
    }

    /// The shell without any injected content.
    pub fn bare(&self) -> String {
        self.template.to_string()
    }

    /// Fill the shell: head tags at the end of `<head>`, markup inside the
    /// root element and the hydration script right after it.
    pub fn assemble(
        &self,
        markup: &AppMarkup,
        payload: Option<&SerializedPayload>,
    ) -> Result<String, RewritingError> {
        let script = payload.map(SerializedPayload::script_tag);

        rewrite_str(
            &self.template,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("head", |el| {
                        el.append(&markup.head, ContentType::Html);
                        Ok(())
                    }),
                    element!(ROOT_SELECTOR, |el| {
                        el.set_inner_content(&markup.body, ContentType::Html);
                        if let Some(script) = script.as_deref() {
                            el.after(script, ContentType::Html);
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        )
    }
}

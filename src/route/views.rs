//! Lookup of the renderable bundle for a page type.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::route::{PageType, ViewDescriptor};

#[derive(Debug, Clone, Error)]
pub enum ViewLookupError {
    #[error("no view registered for page type `{0}`")]
    Unknown(String),
    #[error("view for page type `{page_type}` failed to load: {reason}")]
    Load { page_type: String, reason: String },
}

/// Source of view descriptors.
#[async_trait]
pub trait ViewLoader: Send + Sync {
    async fn load(&self, page_type: &PageType) -> Result<ViewDescriptor, ViewLookupError>;
}

/// Static page type → bundle table, configured under `[views]`.
#[derive(Debug, Clone, Default)]
pub struct ViewRegistry {
    bundles: HashMap<PageType, Arc<str>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Arc<str>>,
    {
        Self {
            bundles: entries
                .into_iter()
                .map(|(tag, bundle)| (PageType::parse(tag.as_ref()), bundle.into()))
                .collect(),
        }
    }

    pub fn register(&mut self, page_type: PageType, bundle: impl Into<Arc<str>>) {
        self.bundles.insert(page_type, bundle.into());
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[async_trait]
impl ViewLoader for ViewRegistry {
    async fn load(&self, page_type: &PageType) -> Result<ViewDescriptor, ViewLookupError> {
        self.bundles
            .get(page_type)
            .map(|bundle| ViewDescriptor::new(page_type.clone(), Arc::clone(bundle)))
            .ok_or_else(|| ViewLookupError::Unknown(page_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_resolves_known_types_only() {
        let registry = ViewRegistry::from_entries([("CMS_PAGE", "cms-page"), ("PRODUCT", "product")]);

        let view = registry.load(&PageType::CmsPage).await.expect("cms view");
        assert_eq!(view.bundle(), "cms-page");

        let err = registry
            .load(&PageType::Other("BLOG".into()))
            .await
            .expect_err("unknown type");
        assert!(matches!(err, ViewLookupError::Unknown(tag) if tag == "BLOG"));
    }
}

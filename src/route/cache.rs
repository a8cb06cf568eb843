use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::cache::lock::{rw_read, rw_write};
use crate::domain::route::{RouteKey, RouteOutcome};

const SOURCE: &str = "route::cache";

/// Pathname → outcome map shared by every reader and writer of one session
/// (or one server request).
///
/// Each write replaces the whole entry under the write lock, so readers see
/// either the previous outcome or the new one.
#[derive(Clone, Default)]
pub struct RouteCache {
    entries: Arc<RwLock<HashMap<RouteKey, RouteOutcome>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RouteKey) -> Option<RouteOutcome> {
        rw_read(&self.entries, SOURCE, "get").get(key).cloned()
    }

    pub fn insert(&self, key: RouteKey, outcome: RouteOutcome) -> Option<RouteOutcome> {
        rw_write(&self.entries, SOURCE, "insert").insert(key, outcome)
    }

    /// Pre-populate an entry before the first resolution runs.
    pub fn seed(&self, key: RouteKey, outcome: RouteOutcome) {
        self.insert(key, outcome);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::route::RouteError;

    #[test]
    fn clones_share_entries() {
        let cache = RouteCache::new();
        let other = cache.clone();
        cache.insert(RouteKey::normalize("/a"), RouteOutcome::NotFound);

        assert_eq!(other.get(&RouteKey::normalize("a")), Some(RouteOutcome::NotFound));
        let previous = other.insert(
            RouteKey::normalize("/a"),
            RouteOutcome::Error(RouteError::Network("reset".into())),
        );
        assert_eq!(previous, Some(RouteOutcome::NotFound));
        assert_eq!(cache.len(), 1);
    }
}

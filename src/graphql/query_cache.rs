//! Results of completed queries, shared with hydrating clients.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use serde_json::Value;

use super::operation::Operation;
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "graphql::query_cache";

/// Data-fetch cache keyed by operation name, document and variables.
#[derive(Clone, Default)]
pub struct QueryCache {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(operation: &Operation) -> String {
        format!(
            "{}|{}|{}",
            operation.label(),
            operation.compact_document(),
            operation.variables
        )
    }

    pub fn get(&self, operation: &Operation) -> Option<Value> {
        rw_read(&self.entries, SOURCE, "get")
            .get(&Self::key(operation))
            .cloned()
    }

    pub fn insert(&self, operation: &Operation, data: Value) {
        rw_write(&self.entries, SOURCE, "insert").insert(Self::key(operation), data);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry for embedding in a rendered page.
    pub fn extract(&self) -> BTreeMap<String, Value> {
        rw_read(&self.entries, SOURCE, "extract").clone()
    }

    /// Merge a snapshot taken by [`extract`](Self::extract); restored entries
    /// win over existing ones.
    pub fn restore(&self, snapshot: BTreeMap<String, Value>) {
        rw_write(&self.entries, SOURCE, "restore").extend(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn variables_distinguish_entries() {
        let cache = QueryCache::new();
        let shoes = Operation::from_document("query p($u: String) { p }", json!({"u": "shoes"}));
        let boots = Operation::from_document("query p($u: String) { p }", json!({"u": "boots"}));
        cache.insert(&shoes, json!({"p": 1}));

        assert_eq!(cache.get(&shoes), Some(json!({"p": 1})));
        assert!(cache.get(&boots).is_none());
    }

    #[test]
    fn restore_seeds_from_extract() {
        let source = QueryCache::new();
        let op = Operation::from_document("query p { p }", json!({}));
        source.insert(&op, json!({"p": true}));

        let target = QueryCache::new();
        target.restore(source.extract());
        assert_eq!(target.get(&op), Some(json!({"p": true})));
    }
}

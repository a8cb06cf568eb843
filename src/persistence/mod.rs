//! Namespaced visitor persistence with per-entry expiry.
//!
//! Entries use the browser persistence format so server and client agree on
//! what a visitor has stored:
//!
//! ```text
//! <namespace>__<name> = {"value":"<json>","timeStored":<unix ms>,"ttl":<seconds>}
//! ```

mod backend;
mod context;

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

pub use backend::{CookieStorage, MemoryStorage, StorageBackend, StorageError};
pub use context::{
    ContextDefaults, RequestContext, SIGNIN_TOKEN_KEY, STORE_CODE_KEY, STORE_CURRENCY_KEY,
};

pub const DEFAULT_NAMESPACE: &str = "M2_VENIA_BROWSER_PERSISTENCE";
const SEPARATOR: &str = "__";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    value: String,
    time_stored: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

impl StoredEntry {
    fn is_expired(&self, now_ms: i64) -> bool {
        match self.ttl {
            Some(ttl) if ttl > 0 => {
                let ttl_ms = i64::try_from(ttl.saturating_mul(1000)).unwrap_or(i64::MAX);
                now_ms.saturating_sub(self.time_stored) > ttl_ms
            }
            _ => false,
        }
    }
}

/// Visitor key/value store scoped to one application namespace.
#[derive(Clone)]
pub struct PersistedStore {
    namespace: Arc<str>,
    backend: Arc<dyn StorageBackend>,
}

impl PersistedStore {
    pub fn new(namespace: impl Into<Arc<str>>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
        }
    }

    /// Store backed by process memory, mostly for client sessions and tests.
    pub fn in_memory(namespace: impl Into<Arc<str>>) -> Self {
        Self::new(namespace, Arc::new(MemoryStorage::new()))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn qualify(&self, name: &str) -> String {
        format!("{}{SEPARATOR}{name}", self.namespace)
    }

    fn prefix(&self) -> String {
        format!("{}{SEPARATOR}", self.namespace)
    }

    /// Raw stored envelope for `name`, without decoding or expiry checks.
    pub fn get_raw_item(&self, name: &str) -> Option<String> {
        match self.backend.get(&self.qualify(name)) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    target = "vetrina::persistence",
                    key = name,
                    error = %err,
                    "persisted store read failed"
                );
                None
            }
        }
    }

    /// Decoded value for `name`. Missing, malformed and expired entries all
    /// read as `None`; expired entries are removed.
    pub fn get_item(&self, name: &str) -> Option<Value> {
        let raw = self.get_raw_item(name)?;
        let entry: StoredEntry = serde_json::from_str(&raw).ok()?;

        if entry.is_expired(now_ms()) {
            self.remove_item(name);
            return None;
        }

        serde_json::from_str(&entry.value).ok()
    }

    /// Convenience accessor for string values.
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get_item(name)? {
            Value::String(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    pub fn set_item(&self, name: &str, value: &Value, ttl: Option<Duration>) {
        let entry = StoredEntry {
            value: value.to_string(),
            time_stored: now_ms(),
            ttl: ttl.map(|ttl| ttl.as_secs()),
        };
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(target = "vetrina::persistence", key = name, error = %err, "failed to encode entry");
                return;
            }
        };

        if let Err(err) = self.backend.set(&self.qualify(name), encoded) {
            warn!(
                target = "vetrina::persistence",
                key = name,
                error = %err,
                "persisted store write failed"
            );
        }
    }

    pub fn remove_item(&self, name: &str) {
        if let Err(err) = self.backend.remove(&self.qualify(name)) {
            warn!(
                target = "vetrina::persistence",
                key = name,
                error = %err,
                "persisted store remove failed"
            );
        }
    }

    /// Every namespaced entry, sorted by qualified key, mapped to its encoded
    /// inner value. Foreign keys are skipped; an unavailable backend yields an
    /// empty snapshot.
    pub fn get_all(&self) -> BTreeMap<String, String> {
        let all = match self.backend.all() {
            Ok(all) => all,
            Err(err) => {
                warn!(
                    target = "vetrina::persistence",
                    error = %err,
                    "persisted store snapshot unavailable"
                );
                return BTreeMap::new();
            }
        };

        let prefix = self.prefix();
        all.into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, raw)| {
                serde_json::from_str::<StoredEntry>(&raw)
                    .ok()
                    .map(|entry| (key, entry.value))
            })
            .collect()
    }
}

fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> (PersistedStore, MemoryStorage) {
        let backend = MemoryStorage::new();
        let store = PersistedStore::new("NS", Arc::new(backend.clone()));
        (store, backend)
    }

    #[test]
    fn set_and_get_round_trip_through_envelope() {
        let (store, backend) = store();
        store.set_item("signin_token", &json!("abc"), None);

        let raw = backend.get("NS__signin_token").expect("get").expect("stored");
        assert!(raw.contains("\"value\":\"\\\"abc\\\"\""));
        assert_eq!(store.get_item("signin_token"), Some(json!("abc")));
        assert_eq!(store.get_string("signin_token").as_deref(), Some("abc"));
    }

    #[test]
    fn expired_entries_read_as_absent_and_are_removed() {
        let (store, backend) = store();
        let stale = json!({
            "value": "\"old\"",
            "timeStored": now_ms() - 10_000,
            "ttl": 5
        });
        backend
            .set("NS__store_view_code", stale.to_string())
            .expect("set");

        assert!(store.get_item("store_view_code").is_none());
        assert!(backend.get("NS__store_view_code").expect("get").is_none());
    }

    #[test]
    fn malformed_entries_read_as_absent() {
        let (store, backend) = store();
        backend.set("NS__broken", "not json".into()).expect("set");
        assert!(store.get_item("broken").is_none());
    }

    #[test]
    fn get_all_filters_namespace_and_sorts() {
        let (store, backend) = store();
        store.set_item("zeta", &json!(1), None);
        store.set_item("alpha", &json!("a"), None);
        backend.set("OTHER__alpha", "{}".into()).expect("set");

        let all = store.get_all();
        let keys: Vec<_> = all.keys().cloned().collect();
        assert_eq!(keys, vec!["NS__alpha".to_string(), "NS__zeta".to_string()]);
        assert_eq!(all["NS__alpha"], "\"a\"");
    }
}

//! Raw key/value backends underneath [`PersistedStore`](super::PersistedStore).

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use thiserror::Error;

use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "persistence::backend";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Raw storage operations on fully qualified keys.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn all(&self) -> Result<BTreeMap<String, String>, StorageError>;
}

/// Process-local storage used by client sessions and tests.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(rw_read(&self.entries, SOURCE, "memory.get").get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        rw_write(&self.entries, SOURCE, "memory.set").insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        rw_write(&self.entries, SOURCE, "memory.remove").remove(key);
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        Ok(rw_read(&self.entries, SOURCE, "memory.all").clone())
    }
}

/// Request-scoped storage built from the inbound `Cookie` header.
///
/// Writes stay in the request's jar; they are visible to later reads within
/// the same request and are never sent back to the visitor.
#[derive(Clone, Default)]
pub struct CookieStorage {
    jar: Arc<RwLock<BTreeMap<String, String>>>,
}

impl CookieStorage {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let jar = CookieJar::from_headers(headers);
        let entries = jar
            .iter()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        Self {
            jar: Arc::new(RwLock::new(entries)),
        }
    }
}

impl StorageBackend for CookieStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(rw_read(&self.jar, SOURCE, "cookie.get").get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        rw_write(&self.jar, SOURCE, "cookie.set").insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        rw_write(&self.jar, SOURCE, "cookie.remove").remove(key);
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        Ok(rw_read(&self.jar, SOURCE, "cookie.all").clone())
    }
}

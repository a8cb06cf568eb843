//! Rendered-page storage.
//!
//! [`ResponseCache`] owns expiry and degrades every backend failure to a miss;
//! [`PageStore`] implementations only keep bytes.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{config::ResponseCacheConfig, fingerprint::CacheFingerprint};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_HIT: &str = "vetrina_response_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "vetrina_response_cache_miss_total";
pub(crate) const METRIC_STORE: &str = "vetrina_response_cache_store_total";
pub(crate) const METRIC_UNAVAILABLE: &str = "vetrina_response_cache_unavailable_total";

#[derive(Debug, Error)]
pub enum PageStoreError {
    #[error("page store unavailable: {0}")]
    Unavailable(String),
}

/// Rendered HTTP response kept by the response cache.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: Instant,
}

impl CachedPage {
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= ttl
    }
}

/// Storage backend for rendered pages.
pub trait PageStore: Send + Sync {
    fn get(&self, key: &CacheFingerprint) -> Result<Option<CachedPage>, PageStoreError>;
    fn put(&self, key: CacheFingerprint, page: CachedPage) -> Result<(), PageStoreError>;
    fn remove(&self, key: &CacheFingerprint) -> Result<(), PageStoreError>;
}

/// In-process LRU page store.
pub struct MemoryPageStore {
    pages: RwLock<LruCache<CacheFingerprint, CachedPage>>,
}

impl MemoryPageStore {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self {
            pages: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageStore for MemoryPageStore {
    fn get(&self, key: &CacheFingerprint) -> Result<Option<CachedPage>, PageStoreError> {
        Ok(rw_write(&self.pages, SOURCE, "get").get(key).cloned())
    }

    fn put(&self, key: CacheFingerprint, page: CachedPage) -> Result<(), PageStoreError> {
        let displaced = rw_write(&self.pages, SOURCE, "put").push(key.clone(), page);
        if let Some((evicted, _)) = displaced.filter(|(evicted, _)| *evicted != key) {
            debug!(target = "vetrina::cache", fingerprint = %evicted, "evicted page");
        }
        Ok(())
    }

    fn remove(&self, key: &CacheFingerprint) -> Result<(), PageStoreError> {
        rw_write(&self.pages, SOURCE, "remove").pop(key);
        Ok(())
    }
}

/// TTL cache of rendered pages keyed by [`CacheFingerprint`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn PageStore>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(config: &ResponseCacheConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryPageStore::new(config)))
    }

    pub fn with_store(config: &ResponseCacheConfig, store: Arc<dyn PageStore>) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Servable page for `key`. Expired entries are removed and read as a
    /// miss, as are backend failures.
    pub fn lookup(&self, key: &CacheFingerprint) -> Option<CachedPage> {
        if !self.enabled {
            return None;
        }

        let page = match self.store.get(key) {
            Ok(page) => page,
            Err(err) => {
                counter!(METRIC_UNAVAILABLE).increment(1);
                warn!(target = "vetrina::cache", error = %err, "page store read failed");
                None
            }
        };

        match page {
            Some(page) if page.is_expired(self.ttl, Instant::now()) => {
                if let Err(err) = self.store.remove(key) {
                    warn!(target = "vetrina::cache", error = %err, "page store remove failed");
                }
                counter!(METRIC_MISS).increment(1);
                debug!(target = "vetrina::cache", fingerprint = %key, "expired entry dropped");
                None
            }
            Some(page) => {
                counter!(METRIC_HIT).increment(1);
                Some(page)
            }
            None => {
                counter!(METRIC_MISS).increment(1);
                None
            }
        }
    }

    /// Best-effort insert stamped with the current instant.
    pub fn store(
        &self,
        key: CacheFingerprint,
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) {
        if !self.enabled {
            return;
        }

        let page = CachedPage {
            status,
            headers,
            body,
            stored_at: Instant::now(),
        };
        match self.store.put(key, page) {
            Ok(()) => counter!(METRIC_STORE).increment(1),
            Err(err) => {
                counter!(METRIC_UNAVAILABLE).increment(1);
                warn!(target = "vetrina::cache", error = %err, "page store write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::fingerprint::fingerprint;

    struct BrokenStore;

    impl PageStore for BrokenStore {
        fn get(&self, _: &CacheFingerprint) -> Result<Option<CachedPage>, PageStoreError> {
            Err(PageStoreError::Unavailable("down".into()))
        }

        fn put(&self, _: CacheFingerprint, _: CachedPage) -> Result<(), PageStoreError> {
            Err(PageStoreError::Unavailable("down".into()))
        }

        fn remove(&self, _: &CacheFingerprint) -> Result<(), PageStoreError> {
            Err(PageStoreError::Unavailable("down".into()))
        }
    }

    fn key(path: &str) -> CacheFingerprint {
        fingerprint(path, std::iter::empty::<(&str, &str)>())
    }

    #[tokio::test]
    async fn stored_page_is_served() {
        let cache = ResponseCache::new(&ResponseCacheConfig::default());
        cache.store(key("/a"), 200, vec![], Bytes::from("<html>a</html>"));

        let page = cache.lookup(&key("/a")).expect("hit");
        assert_eq!(page.body, Bytes::from("<html>a</html>"));
        assert!(cache.lookup(&key("/b")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let config = ResponseCacheConfig {
            ttl_secs: 60,
            ..Default::default()
        };
        let cache = ResponseCache::new(&config);
        cache.store(key("/a"), 200, vec![], Bytes::from("a"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.lookup(&key("/a")).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup(&key("/a")).is_none());
    }

    #[tokio::test]
    async fn lru_capacity_bounds_entries() {
        let config = ResponseCacheConfig {
            capacity: 2,
            ..Default::default()
        };
        let store = Arc::new(MemoryPageStore::new(&config));
        let cache = ResponseCache::with_store(&config, store.clone());
        cache.store(key("/a"), 200, vec![], Bytes::from("a"));
        cache.store(key("/b"), 200, vec![], Bytes::from("b"));
        cache.store(key("/c"), 200, vec![], Bytes::from("c"));

        assert_eq!(store.len(), 2);
        assert!(cache.lookup(&key("/a")).is_none());
        assert!(cache.lookup(&key("/c")).is_some());
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_miss() {
        let cache =
            ResponseCache::with_store(&ResponseCacheConfig::default(), Arc::new(BrokenStore));
        cache.store(key("/a"), 200, vec![], Bytes::from("a"));
        assert!(cache.lookup(&key("/a")).is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let config = ResponseCacheConfig {
            enabled: false,
            ..Default::default()
        };
        let cache = ResponseCache::new(&config);
        cache.store(key("/a"), 200, vec![], Bytes::from("a"));
        assert!(cache.lookup(&key("/a")).is_none());
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = MemoryPageStore::new(&ResponseCacheConfig::default());
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.pages.write().expect("pages lock should be acquired");
            panic!("poison pages lock");
        }));

        let page = CachedPage {
            status: 200,
            headers: vec![],
            body: Bytes::from("a"),
            stored_at: Instant::now(),
        };
        store.put(key("/a"), page).expect("put");
        assert_eq!(store.len(), 1);
    }
}

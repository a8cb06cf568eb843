//! Rendered-page response cache.
//!
//! Pages are keyed by [`CacheFingerprint`], which hashes the request URL with
//! the visitor's persisted state. Behavior is controlled via `vetrina.toml`:
//!
//! ```toml
//! [response_cache]
//! enabled = true
//! ttl_seconds = 10000
//! capacity = 500
//! ```

mod config;
mod fingerprint;
pub(crate) mod lock;
mod middleware;
mod store;

pub use config::ResponseCacheConfig;
pub use fingerprint::{CacheFingerprint, fingerprint};
pub use middleware::{CacheDisposition, CacheState, request_fingerprint, response_cache_layer};
pub use store::{CachedPage, MemoryPageStore, PageStore, PageStoreError, ResponseCache};
pub(crate) use store::{METRIC_HIT, METRIC_MISS, METRIC_STORE, METRIC_UNAVAILABLE};

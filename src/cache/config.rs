//! Response cache configuration.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 10_000;
const DEFAULT_CAPACITY: usize = 500;

/// Settings for the rendered-page cache, loaded from the `response_cache`
/// section of `vetrina.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    /// Serve and store rendered pages.
    pub enabled: bool,
    /// Seconds an entry stays servable after it was stored.
    pub ttl_secs: u64,
    /// Maximum number of rendered pages kept in memory.
    pub capacity: usize,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_TTL_SECS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::ResponseCacheSettings> for ResponseCacheConfig {
    fn from(settings: &crate::config::ResponseCacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_secs: settings.ttl_secs.get(),
            capacity: settings.capacity.get(),
        }
    }
}

impl ResponseCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

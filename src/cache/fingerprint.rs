//! Response cache keys derived from the request URL and visitor state.

use std::{collections::BTreeMap, fmt};

use sha2::{Digest, Sha256};

/// Deterministic response cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash `url` together with a persisted-store snapshot.
///
/// Entries are re-sorted by key before encoding, so snapshots that hold the
/// same pairs always hash alike regardless of the order they were produced
/// in.
pub fn fingerprint<I, K, V>(url: &str, snapshot: I) -> CacheFingerprint
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = snapshot
        .into_iter()
        .map(|(key, value)| (key.as_ref().to_string(), value.as_ref().to_string()))
        .collect();
    // A map of strings always encodes.
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical.as_bytes());
    CacheFingerprint(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = vec![("NS__a", "1"), ("NS__b", "\"x\"")];
        let backward = vec![("NS__b", "\"x\""), ("NS__a", "1")];
        assert_eq!(
            fingerprint("/shoes.html?page=2", forward),
            fingerprint("/shoes.html?page=2", backward)
        );
    }

    #[test]
    fn url_and_state_both_contribute() {
        let state = [("NS__store_view_code", "\"default\"")];
        let base = fingerprint("/shoes.html", state);
        assert_ne!(base, fingerprint("/boots.html", state));
        assert_ne!(
            base,
            fingerprint("/shoes.html", [("NS__store_view_code", "\"fr\"")])
        );
        assert_ne!(
            base,
            fingerprint("/shoes.html", std::iter::empty::<(&str, &str)>())
        );
        assert_eq!(base.as_str().len(), 64);
    }
}

//! TTL'd response body store shared by the live and stale tiers.
//!
//! [`ResponseCache`] wraps moka's async cache with per-entry TTLs: each
//! insert carries its own time-to-live, so live entries (short TTL) and
//! stale entries (long TTL) coexist in one store even when clients sharing
//! it are configured with different durations. Expiry is advisory (moka
//! evicts lazily), but an expired entry is never returned from
//! [`ResponseCache::get()`].
//!
//! The store applies its own capacity bound ([`CacheConfig::max_entries`],
//! LRU beyond TTL); callers must not rely on an entry surviving until its
//! TTL under memory pressure.

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;

/// Suffix appended to a request URL to form its stale-tier key.
const STALE_SUFFIX: &str = "-stale";

/// Derive the stale-tier key for a request URL.
///
/// Deterministic: the URL with a `-stale` suffix. The two tiers share one
/// store, so the suffix is what keeps a URL's short-lived and long-lived
/// entries apart.
pub fn stale_key(url: &str) -> String {
    format!("{url}{STALE_SUFFIX}")
}

/// Configuration for the response cache.
///
/// ```rust
/// # use munin::cache::CacheConfig;
/// let config = CacheConfig::new().max_entries(50_000);
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries (live and stale combined). Default: 10,000.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }
}

/// A cached response body together with the TTL it was written under.
#[derive(Clone, Debug)]
struct CachedBody {
    body: String,
    ttl: Duration,
}

/// Expiry policy that reads each entry's own TTL.
///
/// Overwrites restart the clock: an update expires after the *new* value's
/// TTL, not the remainder of the old one.
struct PerEntryTtl;

impl Expiry<String, CachedBody> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedBody,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedBody,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe store for fetched response bodies, with per-entry TTL.
///
/// Exposes the key/value contract the orchestrator needs and nothing else:
/// `get`, `insert`-with-TTL, `flush`. Safe to share across clients behind an
/// `Arc`; moka provides the internal concurrency.
pub struct ResponseCache {
    entries: Cache<String, CachedBody>,
}

impl ResponseCache {
    /// Create an empty cache with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create an empty cache with a custom configuration.
    pub fn with_config(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }

    /// Look up a cached body.
    ///
    /// Returns `None` on miss or when the entry's TTL has elapsed.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).await.map(|entry| entry.body)
    }

    /// Insert (or overwrite) a body under `key`, expiring after `ttl`.
    pub async fn insert(&self, key: impl Into<String>, body: impl Into<String>, ttl: Duration) {
        let entry = CachedBody {
            body: body.into(),
            ttl,
        };
        self.entries.insert(key.into(), entry).await;
    }

    /// Remove every entry, all tiers, for all callers sharing this store.
    pub fn flush(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_key_appends_suffix() {
        assert_eq!(
            stale_key("http://example.com/list"),
            "http://example.com/list-stale"
        );
    }

    #[test]
    fn stale_key_deterministic() {
        assert_eq!(stale_key("http://a/b"), stale_key("http://a/b"));
    }

    #[test]
    fn stale_key_distinct_per_url() {
        assert_ne!(stale_key("http://a/1"), stale_key("http://a/2"));
    }

    #[test]
    fn config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 10_000);
    }

    #[test]
    fn config_builder() {
        let config = CacheConfig::new().max_entries(500);
        assert_eq!(config.max_entries, 500);
    }
}

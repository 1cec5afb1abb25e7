//! Response cache with per-entry TTL
//!
//! Backed by [`moka::sync::Cache`]: each entry expires after the TTL given
//! at insertion, and the cache is bounded by an entry count. Eviction and
//! expiry run inside moka's maintenance tasks, so `entry_count` can lag
//! behind until [`ResponseCache::run_pending_tasks`] is called.
//!
//! # Example
//! ```
//! use minim_auth::cache::{CallSignature, ResponseCache};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(16);
//! let key = CallSignature::new("GET", "https://api.spotify.com/v1/me", None);
//! cache.insert(key.clone(), json!({ "id": "alice" }), Duration::from_secs(60));
//! assert_eq!(cache.get(&key), Some(json!({ "id": "alice" })));
//! ```

use moka::Expiry;
use moka::sync::Cache;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Default maximum number of cached responses
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024;

/// Identity of a cacheable call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    /// HTTP method
    pub method: String,
    /// Absolute URL including the query string
    pub url: String,
    /// Serialized request body, if any
    pub body: Option<String>,
}

impl CallSignature {
    /// Create a call signature
    pub fn new(method: impl Into<String>, url: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    value: Value,
    ttl: Duration,
}

/// Expires each entry after the TTL it was inserted with
struct PerEntryTtl;

impl Expiry<CallSignature, CachedResponse> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CallSignature,
        value: &CachedResponse,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CallSignature,
        value: &CachedResponse,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Thread-safe cache of parsed JSON responses
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<CallSignature, CachedResponse>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity.max(1))
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }

    /// Get a live entry
    pub fn get(&self, key: &CallSignature) -> Option<Value> {
        self.inner.get(key).map(|entry| entry.value)
    }

    /// Insert an entry that lives for `ttl`
    pub fn insert(&self, key: CallSignature, value: Value, ttl: Duration) {
        self.inner.insert(key, CachedResponse { value, ttl });
    }

    /// Remove an entry
    pub fn remove(&self, key: &CallSignature) -> Option<Value> {
        self.inner.remove(key).map(|entry| entry.value)
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of stored entries
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Apply pending evictions and expirations
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(path: &str) -> CallSignature {
        CallSignature::new("GET", format!("https://api.spotify.com/v1/{path}"), None)
    }

    #[test]
    fn test_entries_expire_after_their_own_ttl() {
        let cache = ResponseCache::new(8);
        cache.insert(key("me/player"), json!({ "playing": true }), Duration::from_millis(50));
        cache.insert(key("albums/1"), json!({ "name": "Nevermind" }), Duration::from_secs(60));
        assert!(cache.get(&key("me/player")).is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&key("me/player")), None);
        assert_eq!(cache.get(&key("albums/1")), Some(json!({ "name": "Nevermind" })));
    }

    #[test]
    fn test_reinsert_uses_new_ttl() {
        let cache = ResponseCache::new(8);
        cache.insert(key("me"), json!(1), Duration::from_millis(50));
        cache.insert(key("me"), json!(2), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&key("me")), Some(json!(2)));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ResponseCache::new(4);
        for i in 0..32 {
            cache.insert(key(&format!("albums/{i}")), json!(i), Duration::from_secs(60));
        }
        cache.run_pending_tasks();
        assert!(cache.entry_count() <= 4);
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = ResponseCache::default();
        cache.insert(key("a"), json!("a"), Duration::from_secs(60));
        cache.insert(key("b"), json!("b"), Duration::from_secs(60));

        assert_eq!(cache.remove(&key("a")), Some(json!("a")));
        assert_eq!(cache.get(&key("a")), None);

        cache.clear();
        assert_eq!(cache.get(&key("b")), None);
    }

    #[test]
    fn test_call_signature_distinguishes_bodies() {
        let a = CallSignature::new("GET", "https://api.spotify.com/v1/me", None);
        let b = CallSignature::new("GET", "https://api.spotify.com/v1/me", Some("{}".into()));
        assert_ne!(a, b);
    }
}

//! Resource cache: a URI-keyed cache of previously read resource content
//! with per-entry TTL.
//!
//! Invariant: an entry is visible iff `now - cached_at < max_age`; expired
//! entries are evicted on access. Invariant: a cached read never races with
//! the authoritative handler — writes are serialized per URI, which a
//! `DashMap`'s per-shard locking gives us directly.

use std::time::Duration;

use dashmap::DashMap;
use relaymcp_protocol::types::ResourceContent;

struct CachedResource {
    content: ResourceContent,
    cached_at: std::time::Instant,
    max_age: Duration,
}

impl CachedResource {
    fn is_fresh(&self) -> bool {
        self.cached_at.elapsed() < self.max_age
    }
}

/// Counters exposed through `health/check` (spec SPEC_FULL §C: "cache
/// hit/miss counters").
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Reads satisfied from a fresh cache entry.
    pub hits: u64,
    /// Reads that missed (absent, expired, or `no_cache`).
    pub misses: u64,
}

/// The server's resource cache, keyed by URI.
pub struct ResourceCache {
    entries: DashMap<String, CachedResource>,
    default_max_age: Duration,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ResourceCache {
    /// Construct an empty cache with the given default TTL.
    #[must_use]
    pub fn new(default_max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_max_age,
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Look up `uri`. Returns `None` (and evicts the entry) if it is
    /// absent or stale.
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<ResourceContent> {
        use std::sync::atomic::Ordering;

        let hit = match self.entries.get(uri) {
            Some(entry) if entry.is_fresh() => Some(entry.content.clone()),
            Some(_) => None,
            None => None,
        };

        match hit {
            Some(content) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(content)
            }
            None => {
                self.entries.remove(uri);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `content` under `uri` with `max_age` (or the cache's default
    /// if `None`).
    pub fn put(&self, uri: impl Into<String>, content: ResourceContent, max_age: Option<Duration>) {
        self.entries.insert(
            uri.into(),
            CachedResource {
                content,
                cached_at: std::time::Instant::now(),
                max_age: max_age.unwrap_or(self.default_max_age),
            },
        );
    }

    /// Invalidate a single entry (called on `notifyResourceUpdated` and
    /// `removeResource`).
    pub fn invalidate(&self, uri: &str) {
        self.entries.remove(uri);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Number of live (not necessarily fresh) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(uri: &str) -> ResourceContent {
        ResourceContent::text(uri, "text/plain", "hello")
    }

    #[test]
    fn fresh_entry_is_visible() {
        let cache = ResourceCache::new(Duration::from_secs(60));
        cache.put("test://r", content("test://r"), None);
        assert!(cache.get("test://r").is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_evicted_on_access() {
        let cache = ResourceCache::new(Duration::from_millis(1));
        cache.put("test://r", content("test://r"), None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("test://r").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn invalidate_removes_entry_immediately() {
        let cache = ResourceCache::new(Duration::from_secs(60));
        cache.put("test://r", content("test://r"), None);
        cache.invalidate("test://r");
        assert!(cache.get("test://r").is_none());
    }

    #[test]
    fn per_entry_max_age_overrides_default() {
        let cache = ResourceCache::new(Duration::from_secs(60));
        cache.put("test://r", content("test://r"), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("test://r").is_none());
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use serde_json::Value;

/// In-memory cache of public JSON responses
///
/// Keys look like `projects:list` or `projects:id:<id>`, so a write to a
/// collection can drop every entry for it with [`ResponseCache::invalidate_prefix`].
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: u64,
}

impl ResponseCache {
    /// A zero `ttl` disables caching
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone());

        match &fresh {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => {
                self.entries
                    .remove_if(key, |_, entry| entry.stored_at.elapsed() >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed)
            }
        };
        fresh
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns the number of entries removed
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!("Invalidated {} cache entries for {}", removed, prefix);
        }
        removed
    }

    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        assert!(cache.get("projects:list").is_none());
        cache.insert("projects:list", json!([1, 2]));
        assert_eq!(cache.get("projects:list"), Some(json!([1, 2])));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_expiry() {
        let cache = ResponseCache::new(Duration::from_millis(20));
        cache.insert("about", json!({}));
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("about").is_none());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.insert("skills:list", json!([]));
        assert!(cache.get("skills:list").is_none());
    }

    #[test]
    fn test_invalidate_prefix_and_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("projects:list", json!([]));
        cache.insert("projects:id:abc", json!({}));
        cache.insert("skills:list", json!([]));

        assert_eq!(cache.invalidate_prefix("projects:"), 2);
        assert!(cache.get("skills:list").is_some());
        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.stats().entries, 0);
    }
}

//! In-memory TTL cache for upstream responses.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Response cache keyed by request URL.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl_secs: i64,
}

impl ResponseCache {
    /// Create a cache whose entries live for `ttl_secs`.
    pub fn with_ttl(ttl_secs: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    /// Get a cached response if present and not expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().ok()?;
        let now = Utc::now();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.body.clone())
    }

    /// Store a response.
    pub fn insert(&self, key: impl Into<String>, body: Value) {
        if self.ttl_secs <= 0 {
            return;
        }

        let entry = CacheEntry {
            body,
            expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), entry);
        }
    }

    /// Drop expired entries.
    pub fn clear_expired(&self) {
        let now = Utc::now();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, entry| !entry.is_expired(now));
        }
    }

    /// Number of stored entries (expired ones included until cleared).
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_ttl(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let cache = ResponseCache::with_ttl(60);
        cache.insert("k", json!({"a": 1}));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = ResponseCache::with_ttl(0);
        cache.insert("k", json!(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_expired() {
        let cache = ResponseCache::with_ttl(60);
        cache.insert("k", json!(1));
        if let Ok(mut entries) = cache.entries.write() {
            if let Some(entry) = entries.get_mut("k") {
                entry.expires_at = Utc::now() - Duration::seconds(1);
            }
        }
        assert!(cache.get("k").is_none());
        cache.clear_expired();
        assert!(cache.is_empty());
    }
}

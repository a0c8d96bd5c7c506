use dashmap::{DashMap, DashSet};
use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::broadcast;

use super::{CacheKey, DataCache};

const INVALIDATION_CHANNEL_CAPACITY: usize = 256;

/// Concurrent in-process cache.
///
/// Invalidation marks matching keys stale (values stay readable) and
/// broadcasts the invalidated prefix so readers can refetch without polling.
/// `set` clears the stale mark for its key.
pub struct InMemoryCache {
    entries: DashMap<CacheKey, JsonValue>,
    stale: DashSet<CacheKey>,
    invalidations: broadcast::Sender<CacheKey>,
}

impl fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.entries.len())
            .field("stale", &self.stale.len())
            .finish()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            stale: DashSet::new(),
            invalidations,
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every invalidated prefix from now on.
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<CacheKey> {
        self.invalidations.subscribe()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.stale.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries under `prefix`, sorted by key.
    #[cfg(test)]
    fn entries_under(&self, prefix: &CacheKey) -> Vec<(CacheKey, JsonValue)> {
        let mut out: Vec<(CacheKey, JsonValue)> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl DataCache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<JsonValue> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: CacheKey, value: JsonValue) {
        self.stale.remove(&key);
        self.entries.insert(key, value);
    }

    fn remove(&self, key: &CacheKey) -> Option<JsonValue> {
        self.stale.remove(key);
        self.entries.remove(key).map(|(_, v)| v)
    }

    fn invalidate(&self, key: &CacheKey) {
        for entry in self.entries.iter() {
            if entry.key().starts_with(key) {
                self.stale.insert(entry.key().clone());
            }
        }
        // No receivers is fine.
        let _ = self.invalidations.send(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let cache = InMemoryCache::new();
        let key = CacheKey::new(["entities", "1"]);
        cache.set(key.clone(), json!({"id": 1}));
        assert_eq!(cache.get(&key), Some(json!({"id": 1})));
        assert_eq!(cache.remove(&key), Some(json!({"id": 1})));
        assert!(cache.get(&key).is_none());
        assert!(cache.remove(&key).is_none());
    }

    #[test]
    fn test_invalidate_marks_prefix_stale_and_set_refreshes() {
        let cache = InMemoryCache::new();
        let a = CacheKey::new(["entities", "1"]);
        let listing = CacheKey::new(["entities", "list"]);
        let other = CacheKey::new(["users", "1"]);
        cache.set(a.clone(), json!(1));
        cache.set(listing.clone(), json!([1]));
        cache.set(other.clone(), json!("u"));

        cache.invalidate(&CacheKey::collection("entities"));
        assert!(cache.is_stale(&a));
        assert!(cache.is_stale(&listing));
        assert!(!cache.is_stale(&other));
        assert_eq!(cache.get(&a), Some(json!(1)));

        cache.set(listing.clone(), json!([1, 2]));
        assert!(!cache.is_stale(&listing));
    }

    #[tokio::test]
    async fn test_invalidations_are_broadcast() {
        let cache = InMemoryCache::new();
        let mut rx = cache.subscribe_invalidations();
        cache.invalidate(&CacheKey::collection("entities"));
        assert_eq!(rx.recv().await.unwrap(), CacheKey::collection("entities"));
    }

    #[test]
    fn test_entries_under_prefix_sorted() {
        let cache = InMemoryCache::new();
        cache.set(CacheKey::new(["e", "2"]), json!(2));
        cache.set(CacheKey::new(["e", "1"]), json!(1));
        cache.set(CacheKey::new(["f", "1"]), json!(3));
        let values: Vec<JsonValue> = cache
            .entries_under(&CacheKey::collection("e"))
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
    }
}

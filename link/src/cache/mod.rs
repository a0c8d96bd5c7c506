//! Local data cache kept in step with server mutations.
//!
//! The cache itself is a collaborator behind [`DataCache`];
//! [`CacheSynchronizer`] is the only writer and [`InMemoryCache`] is the
//! bundled implementation.

mod memory;
mod synchronizer;

pub use memory::InMemoryCache;
pub use synchronizer::{CacheSynchronizer, MutationOutcome, DEFAULT_COLLECTION};

use serde_json::Value as JsonValue;
use std::fmt;

use crate::models::EntityId;

/// Hierarchical cache key, e.g. `["entities", "7"]`.
///
/// Invalidating a key invalidates every key it is a prefix of, so
/// `["entities"]` covers the entity keys and any listing/query keys under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Key of every listing/query derived from `collection`.
    pub fn collection(collection: &str) -> Self {
        Self(vec![collection.to_string()])
    }

    pub fn entity(collection: &str, id: &EntityId) -> Self {
        Self(vec![collection.to_string(), id.as_str().to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` falls under `prefix` (a key is a prefix of itself).
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Data-cache collaborator consumed by [`CacheSynchronizer`].
///
/// Implementations must be safe to call from the connection task while
/// readers use them from other threads.
pub trait DataCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<JsonValue>;

    fn set(&self, key: CacheKey, value: JsonValue);

    /// Returns the removed value, if there was one.
    fn remove(&self, key: &CacheKey) -> Option<JsonValue>;

    /// Signal that `key` and every key under it are stale.
    fn invalidate(&self, key: &CacheKey);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matching() {
        let entity = CacheKey::entity("entities", &EntityId::from(7));
        let listing = CacheKey::new(["entities", "list", "page=1"]);
        let prefix = CacheKey::collection("entities");

        assert!(entity.starts_with(&prefix));
        assert!(listing.starts_with(&prefix));
        assert!(entity.starts_with(&entity));
        assert!(!prefix.starts_with(&entity));
        assert!(!CacheKey::collection("other").starts_with(&prefix));
        assert_eq!(entity.to_string(), "[entities, 7]");
    }
}

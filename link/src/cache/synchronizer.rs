use std::sync::Arc;

use crate::error::{AtlasLinkError, Result};
use crate::event_router::{EventRouter, HandlerRegistration};
use crate::models::{topics, DataUpdate, EntityId, EventEnvelope, MutationType};

use super::{CacheKey, DataCache};

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "entities";

/// What a single mutation did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Inserted,
    Replaced,
    Deleted,
    /// `delete` for an id that was not cached.
    AlreadyAbsent,
}

/// Applies `data-update` events to a [`DataCache`].
///
/// Merge rules:
/// - `insert` of a known id behaves as `update`
/// - `update` of an unknown id behaves as `insert`
/// - `delete` removes; a later `update` re-inserts
///
/// Every mutation then invalidates the entity key and the collection prefix.
/// Re-applying the same event yields the same cache contents.
pub struct CacheSynchronizer {
    cache: Arc<dyn DataCache>,
    collection: String,
}

impl std::fmt::Debug for CacheSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSynchronizer").field("collection", &self.collection).finish()
    }
}

impl CacheSynchronizer {
    pub fn new(cache: Arc<dyn DataCache>) -> Self {
        Self::with_collection(cache, DEFAULT_COLLECTION)
    }

    pub fn with_collection(cache: Arc<dyn DataCache>, collection: impl Into<String>) -> Self {
        Self {
            cache,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Register on `data-update`.
    pub fn register(self: Arc<Self>, router: &Arc<EventRouter>) -> HandlerRegistration {
        router.on(topics::DATA_UPDATE, move |event| {
            self.handle(event)?;
            Ok(())
        })
    }

    fn handle(&self, event: &EventEnvelope) -> Result<MutationOutcome> {
        let update: DataUpdate = event.decode()?;
        self.apply(&update)
    }

    pub fn apply(&self, update: &DataUpdate) -> Result<MutationOutcome> {
        let id = EntityId::from_entity(&update.entity).ok_or_else(|| AtlasLinkError::HandlerError {
            topic: topics::DATA_UPDATE.to_string(),
            message: format!("{} payload has no usable id", update.mutation_type),
        })?;
        let key = CacheKey::entity(&self.collection, &id);

        let outcome = match update.mutation_type {
            MutationType::Insert | MutationType::Update => {
                let existed = self.cache.get(&key).is_some();
                self.cache.set(key.clone(), update.entity.clone());
                if existed {
                    MutationOutcome::Replaced
                } else {
                    MutationOutcome::Inserted
                }
            },
            MutationType::Delete => match self.cache.remove(&key) {
                Some(_) => MutationOutcome::Deleted,
                None => MutationOutcome::AlreadyAbsent,
            },
        };

        self.cache.invalidate(&key);
        self.cache.invalidate(&CacheKey::collection(&self.collection));
        log::debug!(
            "[atlas-link] {} {} -> {:?}",
            update.mutation_type,
            key,
            outcome
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryCache>, CacheSynchronizer) {
        let cache = Arc::new(InMemoryCache::new());
        let sync = CacheSynchronizer::new(cache.clone());
        (cache, sync)
    }

    fn update(kind: MutationType, entity: serde_json::Value) -> DataUpdate {
        DataUpdate {
            mutation_type: kind,
            entity,
            timestamp: None,
        }
    }

    fn key(id: i64) -> CacheKey {
        CacheKey::entity(DEFAULT_COLLECTION, &EntityId::from(id))
    }

    #[test]
    fn test_insert_then_delete_leaves_absent() {
        let (cache, sync) = setup();
        assert_eq!(
            sync.apply(&update(MutationType::Insert, json!({"id": 7}))).unwrap(),
            MutationOutcome::Inserted
        );
        assert!(cache.contains(&key(7)));
        assert_eq!(
            sync.apply(&update(MutationType::Delete, json!({"id": 7}))).unwrap(),
            MutationOutcome::Deleted
        );
        assert!(!cache.contains(&key(7)));
    }

    #[test]
    fn test_update_without_prior_entry_inserts() {
        let (cache, sync) = setup();
        sync.apply(&update(MutationType::Update, json!({"id": 9, "title": "Y"}))).unwrap();
        assert_eq!(cache.get(&key(9)), Some(json!({"id": 9, "title": "Y"})));
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let (cache, sync) = setup();
        let event = update(MutationType::Insert, json!({"id": 1, "v": 1}));
        sync.apply(&event).unwrap();
        assert_eq!(sync.apply(&event).unwrap(), MutationOutcome::Replaced);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1)), Some(json!({"id": 1, "v": 1})));
    }

    #[test]
    fn test_delete_then_update_reinserts() {
        let (cache, sync) = setup();
        sync.apply(&update(MutationType::Insert, json!({"id": 3}))).unwrap();
        sync.apply(&update(MutationType::Delete, json!({"id": 3}))).unwrap();
        assert_eq!(
            sync.apply(&update(MutationType::Delete, json!({"id": 3}))).unwrap(),
            MutationOutcome::AlreadyAbsent
        );
        sync.apply(&update(MutationType::Update, json!({"id": 3, "v": 2}))).unwrap();
        assert_eq!(cache.get(&key(3)), Some(json!({"id": 3, "v": 2})));
    }

    #[test]
    fn test_string_and_numeric_ids_are_the_same_entity() {
        let (cache, sync) = setup();
        sync.apply(&update(MutationType::Insert, json!({"id": 7, "v": 1}))).unwrap();
        sync.apply(&update(MutationType::Update, json!({"id": "7", "v": 2}))).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mutation_invalidates_entity_and_listing_keys() {
        let (cache, sync) = setup();
        let listing = CacheKey::new([DEFAULT_COLLECTION, "list"]);
        cache.set(listing.clone(), json!([]));
        let mut rx = cache.subscribe_invalidations();

        sync.apply(&update(MutationType::Insert, json!({"id": 5}))).unwrap();

        assert!(cache.is_stale(&listing));
        assert_eq!(rx.try_recv().unwrap(), key(5));
        assert_eq!(rx.try_recv().unwrap(), CacheKey::collection(DEFAULT_COLLECTION));
    }

    #[test]
    fn test_missing_id_is_handler_error() {
        let (cache, sync) = setup();
        let err = sync.apply(&update(MutationType::Insert, json!({"title": "X"}))).unwrap_err();
        assert!(matches!(err, AtlasLinkError::HandlerError { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_registered_handler_applies_dispatched_events() {
        let router = Arc::new(EventRouter::new());
        let (cache, sync) = setup();
        Arc::new(sync).register(&router);

        let report = router.dispatch(
            topics::DATA_UPDATE,
            json!({"mutation_type": "insert", "entity": {"id": 7, "title": "X"}}),
        );
        assert_eq!(report.delivered, 1);
        assert!(cache.contains(&key(7)));

        let report = router.dispatch(topics::DATA_UPDATE, json!({"mutation_type": "bogus"}));
        assert_eq!(report.failed, 1);
    }
}

//! In-memory cache stores.
//!
//! # Responsibility
//! - Hold per-entity-type key/value maps behind a uniform access trait.
//! - Provide the process-global store, the null store, and the application
//!   bundle that owns one store per cached type.
//!
//! # Invariants
//! - Individual get/set/clear operations are safe for concurrent callers;
//!   no cross-operation locking is provided.
//! - Values handed out are clones; callers never share an instance with the
//!   cache.

use crate::model::container::Container;
use crate::model::language::Language;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// One cached value for an entity type.
#[derive(Debug, Clone)]
pub enum CacheEntry<E> {
    /// A single cached entity.
    Hit(E),
    /// A cached "not found" marker preventing repeated store misses.
    Miss,
    /// The entire ordered collection of a type, with its capture instant.
    Dataset { items: Vec<E>, cached_at: Instant },
}

/// Uniform access contract over cache stores.
///
/// Implemented by the global store, the scope-local store and the null
/// store; repositories only ever see this trait.
pub trait CacheAccess<E: Clone>: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry<E>>;

    fn set(&self, key: &str, entry: CacheEntry<E>);

    fn clear(&self, key: &str);

    fn clear_prefix(&self, prefix: &str);

    /// Key-ordered defensive copies of every `Hit` entry under `prefix`.
    fn hits_with_prefix(&self, prefix: &str) -> Vec<(String, E)>;
}

/// Process-global, per-entity-type cache store.
#[derive(Debug)]
pub struct EntityCache<E> {
    entries: Mutex<HashMap<String, CacheEntry<E>>>,
}

impl<E> EntityCache<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<E>>> {
        self.entries.lock().expect("cache mutex poisoned")
    }
}

impl<E> Default for EntityCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send> CacheAccess<E> for EntityCache<E> {
    fn get(&self, key: &str) -> Option<CacheEntry<E>> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, entry: CacheEntry<E>) {
        self.lock().insert(key.to_string(), entry);
    }

    fn clear(&self, key: &str) {
        self.lock().remove(key);
    }

    fn clear_prefix(&self, prefix: &str) {
        self.lock().retain(|key, _| !key.starts_with(prefix));
    }

    fn hits_with_prefix(&self, prefix: &str) -> Vec<(String, E)> {
        let entries = self.lock();
        let mut hits: Vec<(String, E)> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, entry)| match entry {
                CacheEntry::Hit(value) => Some((key.clone(), value.clone())),
                CacheEntry::Miss | CacheEntry::Dataset { .. } => None,
            })
            .collect();
        hits.sort_by(|(a, _), (b, _)| a.cmp(b));
        hits
    }
}

/// Null-object store for repositories that must not cache.
pub struct NullCache;

impl<E: Clone> CacheAccess<E> for NullCache {
    fn get(&self, _key: &str) -> Option<CacheEntry<E>> {
        None
    }

    fn set(&self, _key: &str, _entry: CacheEntry<E>) {}

    fn clear(&self, _key: &str) {}

    fn clear_prefix(&self, _prefix: &str) {}

    fn hits_with_prefix(&self, _prefix: &str) -> Vec<(String, E)> {
        Vec::new()
    }
}

/// Application-owned bundle of global cache stores, one per cached type.
///
/// Created once at application start and injected into repositories; there
/// is no ambient static cache state.
#[derive(Default)]
pub struct AppCaches {
    languages: Arc<EntityCache<Language>>,
    containers: Arc<EntityCache<Container>>,
}

impl AppCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn languages(&self) -> Arc<EntityCache<Language>> {
        self.languages.clone()
    }

    pub fn containers(&self) -> Arc<EntityCache<Container>> {
        self.containers.clone()
    }

    /// Evicts everything, e.g. on application shutdown or reset.
    pub fn clear_all(&self) {
        CacheAccess::<Language>::clear_prefix(self.languages.as_ref(), "");
        CacheAccess::<Container>::clear_prefix(self.containers.as_ref(), "");
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheAccess, CacheEntry, EntityCache, NullCache};

    #[test]
    fn set_get_clear_roundtrip() {
        let cache = EntityCache::new();
        cache.set("t:1", CacheEntry::Hit(1u8));
        assert!(matches!(cache.get("t:1"), Some(CacheEntry::Hit(1))));

        cache.clear("t:1");
        assert!(cache.get("t:1").is_none());
    }

    #[test]
    fn clear_prefix_only_evicts_matching_keys() {
        let cache = EntityCache::new();
        cache.set("a:1", CacheEntry::Hit(1u8));
        cache.set("b:1", CacheEntry::Hit(2u8));

        cache.clear_prefix("a:");
        assert!(cache.get("a:1").is_none());
        assert!(cache.get("b:1").is_some());
    }

    #[test]
    fn hits_with_prefix_skips_markers_and_orders_by_key() {
        let cache = EntityCache::new();
        cache.set("t:2", CacheEntry::Hit(2u8));
        cache.set("t:1", CacheEntry::Hit(1u8));
        cache.set("t:3", CacheEntry::Miss);

        let hits = cache.hits_with_prefix("t:");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "t:1");
        assert_eq!(hits[1].0, "t:2");
    }

    #[test]
    fn null_cache_never_stores() {
        let cache = NullCache;
        CacheAccess::<u8>::set(&cache, "t:1", CacheEntry::Hit(1));
        assert!(CacheAccess::<u8>::get(&cache, "t:1").is_none());
    }
}

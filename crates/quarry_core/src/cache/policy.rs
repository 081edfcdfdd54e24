//! Cache policy strategies consulted by the repository façade.
//!
//! # Responsibility
//! - Decide, per read and write, how a repository interacts with its cache
//!   store.
//! - Keep cache state consistent with confirmed store writes.
//!
//! # Invariants
//! - The cache is only mutated after the store write succeeded; on store
//!   failure the cache is left exactly as it was.
//! - Values returned from cached collections are defensive copies.

use crate::cache::key::{dataset_key, entity_key};
use crate::cache::store::{CacheAccess, CacheEntry};
use crate::model::entity::Entity;
use crate::repo::repository::EntityGateway;
use crate::repo::RepoResult;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Caching strategy selected per repository, matched exhaustively once at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicyKind {
    /// Per-identifier lazy caching with negative markers.
    Default {
        /// Validate the cached full view against a fresh store count on
        /// fetch-all, clearing and refetching on mismatch.
        validate_count: bool,
    },
    /// One cache entry holds the entire collection; reads filter it.
    FullDataset {
        /// Expiring sub-mode: entries older than this trigger a wholesale
        /// refetch on access. `None` never expires.
        ttl: Option<Duration>,
    },
    /// Straight pass-through for append-only or write-heavy types.
    NoCache,
}

pub(crate) struct PolicyCtx<'a, G: EntityGateway> {
    pub gateway: &'a G,
    pub cache: &'a dyn CacheAccess<G::Entity>,
    pub prefix: &'a str,
}

/// Strategy object behind the repository façade.
pub(crate) trait CachePolicy<G: EntityGateway>: Send + Sync {
    fn get(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<Option<G::Entity>>;

    fn get_many(&self, ctx: &PolicyCtx<'_, G>, ids: &[G::Id]) -> RepoResult<Vec<G::Entity>>;

    fn exists(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<bool>;

    fn create(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()>;

    fn update(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()>;

    fn delete(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()>;
}

pub(crate) fn build_policy<G: EntityGateway>(kind: CachePolicyKind) -> Box<dyn CachePolicy<G>> {
    match kind {
        CachePolicyKind::Default { validate_count } => {
            Box::new(DefaultCachePolicy { validate_count })
        }
        CachePolicyKind::FullDataset { ttl } => Box::new(FullDatasetCachePolicy { ttl }),
        CachePolicyKind::NoCache => Box::new(NoCachePolicy),
    }
}

struct DefaultCachePolicy {
    validate_count: bool,
}

impl DefaultCachePolicy {
    fn get_all<G: EntityGateway>(&self, ctx: &PolicyCtx<'_, G>) -> RepoResult<Vec<G::Entity>> {
        let cached = ctx.cache.hits_with_prefix(ctx.prefix);
        if self.validate_count && !cached.is_empty() {
            let stored = ctx.gateway.count(None)?;
            if cached.len() as u64 == stored {
                return Ok(cached.into_iter().map(|(_, entity)| entity).collect());
            }
            debug!(
                "event=cache_refresh module=cache status=stale node_type={} cached={} stored={}",
                ctx.gateway.node_type(),
                cached.len(),
                stored
            );
            ctx.cache.clear_prefix(ctx.prefix);
        }

        let fetched = ctx.gateway.fetch_by_ids(&[])?;
        for entity in &fetched {
            if let Some(key) = entity.id().and_then(|id| entity_key(ctx.prefix, &id)) {
                ctx.cache.set(&key, CacheEntry::Hit(entity.clone()));
            }
        }
        Ok(fetched)
    }
}

impl<G: EntityGateway> CachePolicy<G> for DefaultCachePolicy {
    fn get(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<Option<G::Entity>> {
        let Some(key) = entity_key(ctx.prefix, id) else {
            return ctx.gateway.fetch_by_id(id);
        };

        match ctx.cache.get(&key) {
            Some(CacheEntry::Hit(entity)) => Ok(Some(entity)),
            Some(CacheEntry::Miss) => Ok(None),
            Some(CacheEntry::Dataset { .. }) | None => {
                let fetched = ctx.gateway.fetch_by_id(id)?;
                match &fetched {
                    Some(entity) => ctx.cache.set(&key, CacheEntry::Hit(entity.clone())),
                    None => ctx.cache.set(&key, CacheEntry::Miss),
                }
                Ok(fetched)
            }
        }
    }

    fn get_many(&self, ctx: &PolicyCtx<'_, G>, ids: &[G::Id]) -> RepoResult<Vec<G::Entity>> {
        if ids.is_empty() {
            return self.get_all(ctx);
        }

        let mut resolved: HashMap<G::Id, G::Entity> = HashMap::new();
        let mut missing: Vec<G::Id> = Vec::new();
        for id in ids {
            match entity_key(ctx.prefix, id).and_then(|key| ctx.cache.get(&key)) {
                Some(CacheEntry::Hit(entity)) => {
                    resolved.insert(id.clone(), entity);
                }
                // Known absent; do not refetch.
                Some(CacheEntry::Miss) => {}
                Some(CacheEntry::Dataset { .. }) | None => missing.push(id.clone()),
            }
        }

        if !missing.is_empty() {
            let fetched = ctx.gateway.fetch_by_ids(&missing)?;
            let mut found: HashSet<G::Id> = HashSet::new();
            for entity in fetched {
                let Some(id) = entity.id() else { continue };
                if let Some(key) = entity_key(ctx.prefix, &id) {
                    ctx.cache.set(&key, CacheEntry::Hit(entity.clone()));
                }
                found.insert(id.clone());
                resolved.insert(id, entity);
            }
            for id in &missing {
                if found.contains(id) {
                    continue;
                }
                if let Some(key) = entity_key(ctx.prefix, id) {
                    ctx.cache.set(&key, CacheEntry::Miss);
                }
            }
        }

        Ok(ids.iter().filter_map(|id| resolved.remove(id)).collect())
    }

    fn exists(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<bool> {
        let Some(key) = entity_key(ctx.prefix, id) else {
            return Ok(ctx.gateway.fetch_by_id(id)?.is_some());
        };

        match ctx.cache.get(&key) {
            Some(CacheEntry::Hit(_)) => Ok(true),
            Some(CacheEntry::Miss) => Ok(false),
            Some(CacheEntry::Dataset { .. }) | None => {
                let fetched = ctx.gateway.fetch_by_id(id)?;
                match &fetched {
                    Some(entity) => ctx.cache.set(&key, CacheEntry::Hit(entity.clone())),
                    None => ctx.cache.set(&key, CacheEntry::Miss),
                }
                Ok(fetched.is_some())
            }
        }
    }

    fn create(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_new(entity)?;
        if let Some(key) = entity.id().and_then(|id| entity_key(ctx.prefix, &id)) {
            ctx.cache.set(&key, CacheEntry::Hit(entity.clone()));
        }
        Ok(())
    }

    fn update(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_updated(entity)?;
        if let Some(key) = entity.id().and_then(|id| entity_key(ctx.prefix, &id)) {
            ctx.cache.set(&key, CacheEntry::Hit(entity.clone()));
        }
        Ok(())
    }

    fn delete(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_deleted(entity)?;
        if let Some(key) = entity.id().and_then(|id| entity_key(ctx.prefix, &id)) {
            ctx.cache.clear(&key);
        }
        Ok(())
    }
}

struct FullDatasetCachePolicy {
    ttl: Option<Duration>,
}

impl FullDatasetCachePolicy {
    fn load_dataset<G: EntityGateway>(&self, ctx: &PolicyCtx<'_, G>) -> RepoResult<Vec<G::Entity>> {
        let key = dataset_key(ctx.prefix);
        if let Some(CacheEntry::Dataset { items, cached_at }) = ctx.cache.get(&key) {
            let expired = self.ttl.is_some_and(|ttl| cached_at.elapsed() >= ttl);
            if !expired {
                return Ok(items);
            }
            debug!(
                "event=cache_refresh module=cache status=expired node_type={}",
                ctx.gateway.node_type()
            );
        }

        let items = ctx.gateway.fetch_by_ids(&[])?;
        ctx.cache.set(
            &key,
            CacheEntry::Dataset {
                items: items.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(items)
    }

    fn invalidate<G: EntityGateway>(&self, ctx: &PolicyCtx<'_, G>) {
        ctx.cache.clear(&dataset_key(ctx.prefix));
    }
}

impl<G: EntityGateway> CachePolicy<G> for FullDatasetCachePolicy {
    fn get(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<Option<G::Entity>> {
        let items = self.load_dataset(ctx)?;
        Ok(items
            .into_iter()
            .find(|entity| entity.id().as_ref() == Some(id)))
    }

    fn get_many(&self, ctx: &PolicyCtx<'_, G>, ids: &[G::Id]) -> RepoResult<Vec<G::Entity>> {
        let items = self.load_dataset(ctx)?;
        if ids.is_empty() {
            return Ok(items);
        }

        let mut by_id: HashMap<G::Id, G::Entity> = items
            .into_iter()
            .filter_map(|entity| entity.id().map(|id| (id, entity)))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn exists(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<bool> {
        let items = self.load_dataset(ctx)?;
        Ok(items
            .iter()
            .any(|entity| entity.id().as_ref() == Some(id)))
    }

    fn create(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_new(entity)?;
        self.invalidate(ctx);
        Ok(())
    }

    fn update(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_updated(entity)?;
        self.invalidate(ctx);
        Ok(())
    }

    fn delete(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_deleted(entity)?;
        self.invalidate(ctx);
        Ok(())
    }
}

struct NoCachePolicy;

impl<G: EntityGateway> CachePolicy<G> for NoCachePolicy {
    fn get(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<Option<G::Entity>> {
        ctx.gateway.fetch_by_id(id)
    }

    fn get_many(&self, ctx: &PolicyCtx<'_, G>, ids: &[G::Id]) -> RepoResult<Vec<G::Entity>> {
        ctx.gateway.fetch_by_ids(ids)
    }

    fn exists(&self, ctx: &PolicyCtx<'_, G>, id: &G::Id) -> RepoResult<bool> {
        Ok(ctx.gateway.fetch_by_id(id)?.is_some())
    }

    fn create(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_new(entity)
    }

    fn update(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_updated(entity)
    }

    fn delete(&self, ctx: &PolicyCtx<'_, G>, entity: &mut G::Entity) -> RepoResult<()> {
        ctx.gateway.persist_deleted(entity)
    }
}

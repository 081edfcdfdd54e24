//! Generic repository façade and the gateway contract behind it.
//!
//! # Responsibility
//! - Coordinate cache policy and store primitives for every operation.
//! - Enforce batch capacity and identifier deduplication.
//!
//! # Invariants
//! - Identified reads are resolved entirely through the active cache
//!   policy; the façade never queries the store directly for them.
//! - Predicate reads and counts always bypass the cache.
//! - Save routes to insert when the entity lacks identity, update
//!   otherwise.

use crate::cache::policy::{build_policy, CachePolicy, CachePolicyKind, PolicyCtx};
use crate::cache::store::CacheAccess;
use crate::model::entity::{Entity, EntityId};
use crate::repo::{RepoError, RepoResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on identifiers accepted by one batched read.
pub const MAX_BATCH_IDS: usize = 2000;

/// Abstract store primitives supplied by each concrete repository.
///
/// The façade coordinates these with caching; it never reimplements them.
pub trait EntityGateway {
    type Id: EntityId;
    type Entity: Entity<Id = Self::Id>;
    type Predicate;

    /// Type discriminator used in diagnostics and delete cascades.
    fn node_type(&self) -> &'static str;

    /// Stable per-type cache key prefix.
    fn cache_prefix(&self) -> &str;

    fn fetch_by_id(&self, id: &Self::Id) -> RepoResult<Option<Self::Entity>>;

    /// An empty `ids` slice means "fetch every entity of this type".
    fn fetch_by_ids(&self, ids: &[Self::Id]) -> RepoResult<Vec<Self::Entity>>;

    fn fetch_by_predicate(&self, predicate: &Self::Predicate) -> RepoResult<Vec<Self::Entity>>;

    /// Row count, optionally narrowed by a predicate.
    fn count(&self, predicate: Option<&Self::Predicate>) -> RepoResult<u64>;

    /// Inserts the entity and assigns its identity.
    fn persist_new(&self, entity: &mut Self::Entity) -> RepoResult<()>;

    fn persist_updated(&self, entity: &mut Self::Entity) -> RepoResult<()>;

    fn persist_deleted(&self, entity: &mut Self::Entity) -> RepoResult<()>;
}

/// Generic repository façade over one gateway and one cache policy.
pub struct Repository<G: EntityGateway> {
    gateway: G,
    cache: Arc<dyn CacheAccess<G::Entity>>,
    policy: Box<dyn CachePolicy<G>>,
}

impl<G: EntityGateway> Repository<G> {
    pub fn new(
        gateway: G,
        cache: Arc<dyn CacheAccess<G::Entity>>,
        policy: CachePolicyKind,
    ) -> Self {
        let policy = build_policy::<G>(policy);
        Self {
            gateway,
            cache,
            policy,
        }
    }

    fn ctx(&self) -> PolicyCtx<'_, G> {
        PolicyCtx {
            gateway: &self.gateway,
            cache: self.cache.as_ref(),
            prefix: self.gateway.cache_prefix(),
        }
    }

    pub fn get(&self, id: &G::Id) -> RepoResult<Option<G::Entity>> {
        self.policy.get(&self.ctx(), id)
    }

    /// Batched read; rejects oversized batches before any store call and
    /// deduplicates identifiers preserving input order.
    pub fn get_many(&self, ids: &[G::Id]) -> RepoResult<Vec<G::Entity>> {
        if ids.len() > MAX_BATCH_IDS {
            return Err(RepoError::Capacity {
                requested: ids.len(),
                max: MAX_BATCH_IDS,
            });
        }

        let mut seen: HashSet<G::Id> = HashSet::with_capacity(ids.len());
        let deduped: Vec<G::Id> = ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();
        self.policy.get_many(&self.ctx(), &deduped)
    }

    pub fn get_all(&self) -> RepoResult<Vec<G::Entity>> {
        self.policy.get_many(&self.ctx(), &[])
    }

    /// Predicate reads always bypass the cache; predicates are open-ended.
    pub fn get_by_predicate(&self, predicate: &G::Predicate) -> RepoResult<Vec<G::Entity>> {
        self.gateway.fetch_by_predicate(predicate)
    }

    pub fn exists(&self, id: &G::Id) -> RepoResult<bool> {
        self.policy.exists(&self.ctx(), id)
    }

    /// Counts always execute against the store.
    pub fn count(&self, predicate: Option<&G::Predicate>) -> RepoResult<u64> {
        self.gateway.count(predicate)
    }

    pub fn save(&self, entity: &mut G::Entity) -> RepoResult<()> {
        if entity.has_identity() {
            self.policy.update(&self.ctx(), entity)
        } else {
            self.policy.create(&self.ctx(), entity)
        }
    }

    pub fn delete(&self, entity: &mut G::Entity) -> RepoResult<()> {
        self.policy.delete(&self.ctx(), entity)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

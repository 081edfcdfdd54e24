//! Cached repository framework over SQLite storage.
//!
//! One generic repository façade coordinates abstract store primitives with
//! a pluggable cache policy; unit-of-work scopes decide whether cache
//! writes target the global store, a buffered scope-local store, or no
//! store at all. This crate is the single source of truth for the cache
//! coherency and tree/singleton business invariants.

pub mod cache;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use cache::policy::CachePolicyKind;
pub use cache::scope::{CacheIsolation, CacheIsolationProvider, Scope, ScopedCache};
pub use cache::store::{AppCaches, CacheAccess, CacheEntry, EntityCache, NullCache};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::audit::{AuditAction, AuditEntry};
pub use model::container::{Container, ROOT_PARENT_ID};
pub use model::entity::{Entity, EntityId, EntityMeta, ValidationError};
pub use model::language::Language;
pub use repo::audit_repo::{AuditPredicate, AuditRepository, SqliteAuditGateway};
pub use repo::container_repo::{
    ContainerPredicate, ContainerRepository, SqliteContainerGateway, DOCUMENT_CONTAINER,
    MEDIA_CONTAINER,
};
pub use repo::language_repo::{LanguageRepository, SqliteLanguageGateway};
pub use repo::repository::{EntityGateway, Repository, MAX_BATCH_IDS};
pub use repo::{IntegrityViolation, RepoError, RepoResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

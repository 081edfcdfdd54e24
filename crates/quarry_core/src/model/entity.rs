//! Entity identity and lifecycle primitives.
//!
//! # Responsibility
//! - Define the identifier contract used for cache key composition.
//! - Track per-entity bookkeeping: identity, dirty properties, soft delete.
//!
//! # Invariants
//! - `has_identity` is false until the first successful persist.
//! - An entity without identity never contributes a cache key.
//! - String identifier tokens are upper-cased for case-insensitive lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::Hash;
use uuid::Uuid;

/// Identifier contract for cached entities.
///
/// Identifiers must be cheap to clone and have a stable string form; the
/// string form is what ends up inside cache keys.
pub trait EntityId: Clone + Eq + Hash + Display {
    /// String form of this identifier used inside cache keys.
    ///
    /// An empty token never participates in cache lookups.
    fn cache_token(&self) -> String {
        self.to_string()
    }
}

impl EntityId for i64 {}

impl EntityId for Uuid {}

impl EntityId for String {
    // String identifiers are matched case-insensitively in the cache.
    fn cache_token(&self) -> String {
        self.to_ascii_uppercase()
    }
}

/// Per-entity lifecycle bookkeeping embedded in every model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    has_identity: bool,
    deleted_at: Option<i64>,
    #[serde(skip)]
    dirty: BTreeSet<&'static str>,
}

impl EntityMeta {
    /// Bookkeeping for an entity that has never been persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookkeeping for an entity hydrated from a persisted row.
    pub fn persisted(deleted_at: Option<i64>) -> Self {
        Self {
            has_identity: true,
            deleted_at,
            dirty: BTreeSet::new(),
        }
    }

    pub fn has_identity(&self) -> bool {
        self.has_identity
    }

    /// Marks the entity as persisted and resets the dirty set.
    ///
    /// Gateways call this after a confirmed insert.
    pub fn mark_persisted(&mut self) {
        self.has_identity = true;
        self.dirty.clear();
    }

    pub fn mark_dirty(&mut self, property: &'static str) {
        self.dirty.insert(property);
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_property_dirty(&self, property: &str) -> bool {
        self.dirty.contains(property)
    }

    /// Resets the dirty set after a confirmed update.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn deleted_at(&self) -> Option<i64> {
        self.deleted_at
    }

    /// Records the soft-delete timestamp after a confirmed delete.
    pub fn mark_deleted(&mut self, at_epoch_ms: i64) {
        self.deleted_at = Some(at_epoch_ms);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Contract every repository-managed model implements.
pub trait Entity: Clone {
    type Id: EntityId;

    /// Identifier assigned at first persist; `None` before that.
    fn id(&self) -> Option<Self::Id>;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    fn has_identity(&self) -> bool {
        self.meta().has_identity()
    }
}

/// Pre-write validation failures shared by all models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Node type discriminator is blank.
    BlankNodeType,
    /// Audit actor is blank after trim.
    BlankActor,
    /// ISO code does not match the expected language-tag shape.
    InvalidIsoCode { value: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::BlankNodeType => write!(f, "node type must not be blank"),
            Self::BlankActor => write!(f, "actor must not be blank"),
            Self::InvalidIsoCode { value } => write!(f, "invalid iso code `{value}`"),
        }
    }
}

impl Error for ValidationError {}

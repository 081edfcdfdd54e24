//! Tree container domain model.
//!
//! # Responsibility
//! - Define the hierarchical grouping record with materialized path/level.
//! - Track parent changes through the dirty set so update paths can react.
//!
//! # Invariants
//! - `path` is the comma-joined ancestor id chain, starting with the root
//!   sentinel and ending with the node's own id.
//! - `level` equals the number of ancestors plus one; root-level nodes are
//!   level 1.
//! - Sibling names are unique among active nodes of one node type; enforced
//!   by the container repository.

use crate::model::entity::{Entity, EntityMeta, ValidationError};
use serde::{Deserialize, Serialize};

/// Sentinel parent id for root-level containers.
pub const ROOT_PARENT_ID: i64 = -1;

/// Container record backed by the `containers` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    id: Option<i64>,
    parent_id: i64,
    node_type: String,
    name: String,
    level: i32,
    path: String,
    meta: EntityMeta,
}

impl Container {
    /// Creates a new, not-yet-persisted container under `parent_id`.
    ///
    /// Level and path stay empty until the repository computes them from the
    /// resolved parent during persist.
    pub fn new(node_type: impl Into<String>, parent_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: None,
            parent_id,
            node_type: node_type.into(),
            name: name.into(),
            level: 0,
            path: String::new(),
            meta: EntityMeta::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn hydrate(
        id: i64,
        parent_id: i64,
        node_type: String,
        name: String,
        level: i32,
        path: String,
        deleted_at: Option<i64>,
    ) -> Self {
        Self {
            id: Some(id),
            parent_id,
            node_type,
            name,
            level,
            path,
            meta: EntityMeta::persisted(deleted_at),
        }
    }

    pub fn parent_id(&self) -> i64 {
        self.parent_id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.meta.mark_dirty("name");
    }

    /// Moves the container under a new parent.
    ///
    /// The repository recomputes level and path on the next save; descendant
    /// rows keep their previously materialized path and level.
    pub fn set_parent_id(&mut self, parent_id: i64) {
        self.parent_id = parent_id;
        self.meta.mark_dirty("parent_id");
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub(crate) fn set_tree_position(&mut self, level: i32, path: String) {
        self.level = level;
        self.path = path;
    }

    /// Checks structural rules before any write is issued.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.node_type.trim().is_empty() {
            return Err(ValidationError::BlankNodeType);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        Ok(())
    }
}

impl Entity for Container {
    type Id = i64;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

//! Append-only audit trail model.
//!
//! # Responsibility
//! - Define the immutable audit record written alongside node mutations.
//!
//! # Invariants
//! - Entries are never updated or deleted once persisted.
//! - `logged_at` is supplied by the caller in epoch milliseconds.

use crate::model::entity::{Entity, EntityMeta, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action recorded by an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A node was created.
    New,
    /// A node was saved.
    Save,
    /// A node was deleted.
    Delete,
    /// A node was moved to another parent.
    Move,
    /// System-initiated maintenance.
    System,
}

/// One immutable audit trail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: Option<Uuid>,
    node_id: i64,
    action: AuditAction,
    actor: String,
    message: String,
    logged_at: i64,
    meta: EntityMeta,
}

impl AuditEntry {
    pub fn new(
        node_id: i64,
        action: AuditAction,
        actor: impl Into<String>,
        message: impl Into<String>,
        logged_at: i64,
    ) -> Self {
        Self {
            id: None,
            node_id,
            action,
            actor: actor.into(),
            message: message.into(),
            logged_at,
            meta: EntityMeta::new(),
        }
    }

    pub(crate) fn hydrate(
        id: Uuid,
        node_id: i64,
        action: AuditAction,
        actor: String,
        message: String,
        logged_at: i64,
    ) -> Self {
        Self {
            id: Some(id),
            node_id,
            action,
            actor,
            message,
            logged_at,
            meta: EntityMeta::persisted(None),
        }
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn logged_at(&self) -> i64 {
        self.logged_at
    }

    pub(crate) fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    /// Checks structural rules before any write is issued.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.actor.trim().is_empty() {
            return Err(ValidationError::BlankActor);
        }
        Ok(())
    }
}

impl Entity for AuditEntry {
    type Id = Uuid;

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

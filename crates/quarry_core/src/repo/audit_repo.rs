//! Audit trail repository: append-only SQLite gateway without caching.
//!
//! # Responsibility
//! - Persist immutable audit entries and serve filtered reads.
//!
//! # Invariants
//! - Entries are never updated or deleted; both paths are rejected before
//!   any SQL runs.
//! - Identifiers are UUIDs assigned at first persist.

use crate::cache::policy::CachePolicyKind;
use crate::cache::store::NullCache;
use crate::model::audit::{AuditAction, AuditEntry};
use crate::model::entity::Entity;
use crate::repo::repository::{EntityGateway, Repository};
use crate::repo::{ensure_connection_ready, sql_placeholders, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::Arc;
use uuid::Uuid;

const AUDIT_SELECT_SQL: &str = "SELECT
    id,
    node_id,
    action,
    actor,
    message,
    logged_at
FROM audit_entries";

/// Store-side filter for audit reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditPredicate {
    /// Restrict to one node.
    pub node_id: Option<i64>,
    /// Restrict to one action kind.
    pub action: Option<AuditAction>,
    /// Entries logged at or after this epoch-ms instant.
    pub since: Option<i64>,
}

/// SQLite-backed gateway for audit rows.
pub struct SqliteAuditGateway<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditGateway<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityGateway for SqliteAuditGateway<'_> {
    type Id = Uuid;
    type Entity = AuditEntry;
    type Predicate = AuditPredicate;

    fn node_type(&self) -> &'static str {
        "audit-entry"
    }

    fn cache_prefix(&self) -> &str {
        "audit:"
    }

    fn fetch_by_id(&self, id: &Uuid) -> RepoResult<Option<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{AUDIT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_audit_row(row)?));
        }
        Ok(None)
    }

    fn fetch_by_ids(&self, ids: &[Uuid]) -> RepoResult<Vec<AuditEntry>> {
        let (sql, bind_values) = if ids.is_empty() {
            (
                format!("{AUDIT_SELECT_SQL} ORDER BY logged_at DESC, id ASC;"),
                Vec::new(),
            )
        } else {
            (
                format!(
                    "{AUDIT_SELECT_SQL}
                     WHERE id IN {}
                     ORDER BY logged_at DESC, id ASC;",
                    sql_placeholders(ids.len())
                ),
                ids.iter().map(|id| Value::Text(id.to_string())).collect(),
            )
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }

    fn fetch_by_predicate(&self, predicate: &AuditPredicate) -> RepoResult<Vec<AuditEntry>> {
        let mut sql = format!("{AUDIT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(node_id) = predicate.node_id {
            sql.push_str(" AND node_id = ?");
            bind_values.push(Value::Integer(node_id));
        }
        if let Some(action) = predicate.action {
            sql.push_str(" AND action = ?");
            bind_values.push(Value::Text(audit_action_to_db(action).to_string()));
        }
        if let Some(since) = predicate.since {
            sql.push_str(" AND logged_at >= ?");
            bind_values.push(Value::Integer(since));
        }

        sql.push_str(" ORDER BY logged_at DESC, id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }

    fn count(&self, predicate: Option<&AuditPredicate>) -> RepoResult<u64> {
        let mut sql = "SELECT COUNT(*) FROM audit_entries WHERE 1 = 1".to_string();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(predicate) = predicate {
            if let Some(node_id) = predicate.node_id {
                sql.push_str(" AND node_id = ?");
                bind_values.push(Value::Integer(node_id));
            }
            if let Some(action) = predicate.action {
                sql.push_str(" AND action = ?");
                bind_values.push(Value::Text(audit_action_to_db(action).to_string()));
            }
            if let Some(since) = predicate.since {
                sql.push_str(" AND logged_at >= ?");
                bind_values.push(Value::Integer(since));
            }
        }
        sql.push(';');

        let mut stmt = self.conn.prepare(&sql)?;
        let count: i64 = stmt.query_row(params_from_iter(bind_values), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn persist_new(&self, entry: &mut AuditEntry) -> RepoResult<()> {
        entry.validate()?;

        let id = entry.id().unwrap_or_else(Uuid::new_v4);
        self.conn.execute(
            "INSERT INTO audit_entries (
                id,
                node_id,
                action,
                actor,
                message,
                logged_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                entry.node_id(),
                audit_action_to_db(entry.action()),
                entry.actor(),
                entry.message(),
                entry.logged_at(),
            ],
        )?;

        entry.assign_id(id);
        entry.meta_mut().mark_persisted();
        Ok(())
    }

    fn persist_updated(&self, _entry: &mut AuditEntry) -> RepoResult<()> {
        Err(RepoError::NotSupported {
            operation: "audit.update",
        })
    }

    fn persist_deleted(&self, _entry: &mut AuditEntry) -> RepoResult<()> {
        Err(RepoError::NotSupported {
            operation: "audit.delete",
        })
    }
}

/// Append-only audit repository; caching has negative value here.
pub struct AuditRepository<'conn> {
    inner: Repository<SqliteAuditGateway<'conn>>,
}

impl<'conn> AuditRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "audit_entries")?;
        let gateway = SqliteAuditGateway::new(conn);
        Ok(Self {
            inner: Repository::new(gateway, Arc::new(NullCache), CachePolicyKind::NoCache),
        })
    }

    /// Appends one entry, assigning its identifier.
    pub fn append(&self, entry: &mut AuditEntry) -> RepoResult<()> {
        self.inner.save(entry)
    }

    pub fn get(&self, id: &Uuid) -> RepoResult<Option<AuditEntry>> {
        self.inner.get(id)
    }

    pub fn get_many(&self, ids: &[Uuid]) -> RepoResult<Vec<AuditEntry>> {
        self.inner.get_many(ids)
    }

    pub fn get_by_predicate(&self, predicate: &AuditPredicate) -> RepoResult<Vec<AuditEntry>> {
        self.inner.get_by_predicate(predicate)
    }

    pub fn exists(&self, id: &Uuid) -> RepoResult<bool> {
        self.inner.exists(id)
    }

    pub fn count(&self, predicate: Option<&AuditPredicate>) -> RepoResult<u64> {
        self.inner.count(predicate)
    }

    /// Rejected: the trail is immutable.
    pub fn save_existing(&self, entry: &mut AuditEntry) -> RepoResult<()> {
        self.inner.save(entry)
    }

    /// Rejected: the trail is immutable.
    pub fn delete(&self, entry: &mut AuditEntry) -> RepoResult<()> {
        self.inner.delete(entry)
    }
}

fn audit_action_to_db(action: AuditAction) -> &'static str {
    match action {
        AuditAction::New => "new",
        AuditAction::Save => "save",
        AuditAction::Delete => "delete",
        AuditAction::Move => "move",
        AuditAction::System => "system",
    }
}

fn parse_audit_action(value: &str) -> Option<AuditAction> {
    match value {
        "new" => Some(AuditAction::New),
        "save" => Some(AuditAction::Save),
        "delete" => Some(AuditAction::Delete),
        "move" => Some(AuditAction::Move),
        "system" => Some(AuditAction::System),
        _ => None,
    }
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<AuditEntry> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in audit_entries.id"))
    })?;

    let action_text: String = row.get("action")?;
    let action = parse_audit_action(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid action `{action_text}` in audit_entries.action"
        ))
    })?;

    Ok(AuditEntry::hydrate(
        id,
        row.get("node_id")?,
        action,
        row.get("actor")?,
        row.get("message")?,
        row.get("logged_at")?,
    ))
}

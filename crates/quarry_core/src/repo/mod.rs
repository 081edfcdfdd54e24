//! Repository layer: error taxonomy, generic façade and SQLite gateways.
//!
//! # Responsibility
//! - Define the error contract shared by every repository.
//! - Keep SQL details inside the gateway implementations.
//!
//! # Invariants
//! - Validation and integrity guards run before any write is issued; a
//!   rejected write leaves both store and cache untouched.
//! - Store failures are propagated unchanged, never retried or swallowed.

use crate::db::{migrations, DbError};
use crate::model::entity::ValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod audit_repo;
pub mod container_repo;
pub mod language_repo;
pub mod repository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Pre-write rule violations that would corrupt managed invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// Another active sibling under the same parent already has this name.
    DuplicateSiblingName { parent_id: i64, name: String },
    /// Another active row already holds this unique key.
    DuplicateKey { key: String },
    /// The operation would leave the managed set without a default entry,
    /// or targets the current default without a replacement in place.
    DefaultRequired,
}

impl Display for IntegrityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSiblingName { parent_id, name } => write!(
                f,
                "name `{name}` already exists under parent {parent_id}"
            ),
            Self::DuplicateKey { key } => write!(f, "duplicate unique key `{key}`"),
            Self::DefaultRequired => {
                write!(f, "operation would leave the set without a default entry")
            }
        }
    }
}

impl Error for IntegrityViolation {}

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Operation intentionally unavailable for this repository.
    NotSupported { operation: &'static str },
    /// Batch request exceeds the maximum identifier count.
    Capacity { requested: usize, max: usize },
    /// A managed invariant would be violated; raised before the write.
    Integrity(IntegrityViolation),
    /// A write references an identifier that does not exist in the store.
    ReferenceMissing { node_type: &'static str, id: String },
    /// Structural validation failed before the write.
    Validation(ValidationError),
    /// Target row does not exist or is soft-deleted.
    NotFound { node_type: &'static str, id: String },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Underlying store failure, propagated unchanged.
    Db(DbError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSupported { operation } => {
                write!(f, "operation `{operation}` is not supported")
            }
            Self::Capacity { requested, max } => write!(
                f,
                "batch of {requested} identifiers exceeds the maximum of {max}"
            ),
            Self::Integrity(err) => write!(f, "{err}"),
            Self::ReferenceMissing { node_type, id } => {
                write!(f, "{node_type} reference not found: {id}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { node_type, id } => write!(f, "{node_type} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Integrity(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IntegrityViolation> for RepoError {
    fn from(value: IntegrityViolation) -> Self {
        Self::Integrity(value)
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Verifies the connection is migrated and carries a required table.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    table: &'static str,
) -> RepoResult<()> {
    let expected_version = migrations::latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::MissingRequiredTable(table));
    }

    Ok(())
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Builds a `(?, ?, ...)` placeholder list for an SQL IN clause.
pub(crate) fn sql_placeholders(count: usize) -> String {
    let mut placeholders = String::with_capacity(count * 3);
    placeholders.push('(');
    for index in 0..count {
        if index > 0 {
            placeholders.push_str(", ");
        }
        placeholders.push('?');
    }
    placeholders.push(')');
    placeholders
}

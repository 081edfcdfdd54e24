//! Language repository: SQLite gateway and singleton-default invariant.
//!
//! # Responsibility
//! - Provide full-dataset-cached language reads and guarded writes.
//! - Keep exactly one active language marked as default.
//!
//! # Invariants
//! - Persisting a new default demotes every other active row in the same
//!   operation.
//! - A write that would leave the active set without a default is rejected
//!   before any SQL mutation.
//! - Callers serialize writes externally; the repository does not lock
//!   across the demote-then-write sequence.

use crate::cache::policy::CachePolicyKind;
use crate::cache::store::CacheAccess;
use crate::model::entity::Entity;
use crate::model::language::Language;
use crate::repo::repository::{EntityGateway, Repository};
use crate::repo::{
    ensure_connection_ready, epoch_ms, sql_placeholders, IntegrityViolation, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior};
use std::sync::Arc;

const LANGUAGE_SELECT_SQL: &str = "SELECT
    id,
    iso_code,
    culture_name,
    is_default,
    deleted_at
FROM languages";

const LANGUAGE_CACHE_PREFIX: &str = "lang:";

/// SQLite-backed gateway for language rows.
pub struct SqliteLanguageGateway<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLanguageGateway<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityGateway for SqliteLanguageGateway<'_> {
    type Id = i64;
    type Entity = Language;
    type Predicate = ();

    fn node_type(&self) -> &'static str {
        "language"
    }

    fn cache_prefix(&self) -> &str {
        LANGUAGE_CACHE_PREFIX
    }

    fn fetch_by_id(&self, id: &i64) -> RepoResult<Option<Language>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{LANGUAGE_SELECT_SQL} WHERE id = ?1 AND deleted_at IS NULL;"
            ))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_language_row(row)?));
        }
        Ok(None)
    }

    fn fetch_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Language>> {
        let (sql, bind_values) = if ids.is_empty() {
            (
                format!("{LANGUAGE_SELECT_SQL} WHERE deleted_at IS NULL ORDER BY id ASC;"),
                Vec::new(),
            )
        } else {
            (
                format!(
                    "{LANGUAGE_SELECT_SQL}
                     WHERE id IN {} AND deleted_at IS NULL
                     ORDER BY id ASC;",
                    sql_placeholders(ids.len())
                ),
                ids.iter().map(|id| Value::Integer(*id)).collect(),
            )
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut languages = Vec::new();
        while let Some(row) = rows.next()? {
            languages.push(parse_language_row(row)?);
        }
        Ok(languages)
    }

    fn fetch_by_predicate(&self, _predicate: &()) -> RepoResult<Vec<Language>> {
        // The whole table lives in one cache entry; open-ended predicates
        // have nothing to add here.
        Err(RepoError::NotSupported {
            operation: "language.get_by_predicate",
        })
    }

    fn count(&self, predicate: Option<&()>) -> RepoResult<u64> {
        if predicate.is_some() {
            return Err(RepoError::NotSupported {
                operation: "language.count_by_predicate",
            });
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM languages WHERE deleted_at IS NULL;",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn persist_new(&self, language: &mut Language) -> RepoResult<()> {
        language.validate()?;
        ensure_unique_iso(self.conn, language.iso_code(), None)?;

        let now = epoch_ms();
        let id = if language.is_default() {
            let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
            insert_language(&tx, language, now)?;
            let id = tx.last_insert_rowid();
            demote_other_defaults(&tx, id, now)?;
            tx.commit()?;
            id
        } else {
            ensure_default_present(self.conn)?;
            insert_language(self.conn, language, now)?;
            self.conn.last_insert_rowid()
        };

        language.assign_id(id);
        language.meta_mut().mark_persisted();
        Ok(())
    }

    fn persist_updated(&self, language: &mut Language) -> RepoResult<()> {
        language.validate()?;
        let id = required_id(language)?;
        ensure_unique_iso(self.conn, language.iso_code(), Some(id))?;

        let now = epoch_ms();
        if language.is_default() {
            let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
            let changed = update_language(&tx, language, id, now)?;
            if changed == 0 {
                return Err(language_not_found(id));
            }
            demote_other_defaults(&tx, id, now)?;
            tx.commit()?;
        } else {
            // Unsetting the flag on the current default would leave the set
            // without one.
            if is_current_default(self.conn, id)? {
                return Err(IntegrityViolation::DefaultRequired.into());
            }
            let changed = update_language(self.conn, language, id, now)?;
            if changed == 0 {
                return Err(language_not_found(id));
            }
        }

        language.meta_mut().clear_dirty();
        Ok(())
    }

    fn persist_deleted(&self, language: &mut Language) -> RepoResult<()> {
        let id = required_id(language)?;
        if is_current_default(self.conn, id)? {
            return Err(IntegrityViolation::DefaultRequired.into());
        }

        let now = epoch_ms();
        let changed = self.conn.execute(
            "UPDATE languages
             SET deleted_at = ?2,
                 updated_at = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(language_not_found(id));
        }

        language.meta_mut().mark_deleted(now);
        Ok(())
    }
}

/// Language repository with full-dataset caching.
pub struct LanguageRepository<'conn> {
    inner: Repository<SqliteLanguageGateway<'conn>>,
}

impl<'conn> LanguageRepository<'conn> {
    /// Creates the repository from a migrated connection and the cache
    /// store resolved for the active scope.
    pub fn try_new(
        conn: &'conn Connection,
        cache: Arc<dyn CacheAccess<Language>>,
    ) -> RepoResult<Self> {
        ensure_connection_ready(conn, "languages")?;
        let gateway = SqliteLanguageGateway::new(conn);
        Ok(Self {
            inner: Repository::new(gateway, cache, CachePolicyKind::FullDataset { ttl: None }),
        })
    }

    pub fn get(&self, id: i64) -> RepoResult<Option<Language>> {
        self.inner.get(&id)
    }

    pub fn get_many(&self, ids: &[i64]) -> RepoResult<Vec<Language>> {
        self.inner.get_many(ids)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Language>> {
        self.inner.get_all()
    }

    pub fn exists(&self, id: i64) -> RepoResult<bool> {
        self.inner.exists(&id)
    }

    pub fn count(&self) -> RepoResult<u64> {
        self.inner.count(None)
    }

    pub fn save(&self, language: &mut Language) -> RepoResult<()> {
        self.inner.save(language)
    }

    pub fn delete(&self, language: &mut Language) -> RepoResult<()> {
        self.inner.delete(language)
    }

    /// Case-insensitive lookup over the cached dataset.
    pub fn get_by_iso_code(&self, iso_code: &str) -> RepoResult<Option<Language>> {
        Ok(self
            .inner
            .get_all()?
            .into_iter()
            .find(|language| language.iso_code().eq_ignore_ascii_case(iso_code)))
    }

    pub fn get_default(&self) -> RepoResult<Option<Language>> {
        Ok(self
            .inner
            .get_all()?
            .into_iter()
            .find(|language| language.is_default()))
    }

    pub fn get_default_iso_code(&self) -> RepoResult<Option<String>> {
        Ok(self
            .get_default()?
            .map(|language| language.iso_code().to_string()))
    }
}

fn insert_language(conn: &Connection, language: &Language, now: i64) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO languages (
            iso_code,
            culture_name,
            is_default,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?4);",
        params![
            language.iso_code(),
            language.culture_name(),
            bool_to_int(language.is_default()),
            now,
        ],
    )?;
    Ok(())
}

fn update_language(conn: &Connection, language: &Language, id: i64, now: i64) -> RepoResult<usize> {
    let changed = conn.execute(
        "UPDATE languages
         SET iso_code = ?1,
             culture_name = ?2,
             is_default = ?3,
             updated_at = ?4
         WHERE id = ?5
           AND deleted_at IS NULL;",
        params![
            language.iso_code(),
            language.culture_name(),
            bool_to_int(language.is_default()),
            now,
            id,
        ],
    )?;
    Ok(changed)
}

fn demote_other_defaults(conn: &Connection, keep_id: i64, now: i64) -> RepoResult<()> {
    conn.execute(
        "UPDATE languages
         SET is_default = 0,
             updated_at = ?2
         WHERE id <> ?1
           AND is_default = 1
           AND deleted_at IS NULL;",
        params![keep_id, now],
    )?;
    Ok(())
}

fn ensure_unique_iso(conn: &Connection, iso_code: &str, exclude_id: Option<i64>) -> RepoResult<()> {
    let taken: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM languages
            WHERE iso_code = ?1 COLLATE NOCASE
              AND deleted_at IS NULL
              AND id <> ?2
        );",
        params![iso_code, exclude_id.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    if taken == 1 {
        return Err(IntegrityViolation::DuplicateKey {
            key: iso_code.to_string(),
        }
        .into());
    }
    Ok(())
}

fn ensure_default_present(conn: &Connection) -> RepoResult<()> {
    let present: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM languages
            WHERE is_default = 1
              AND deleted_at IS NULL
        );",
        [],
        |row| row.get(0),
    )?;
    if present == 0 {
        return Err(IntegrityViolation::DefaultRequired.into());
    }
    Ok(())
}

fn is_current_default(conn: &Connection, id: i64) -> RepoResult<bool> {
    let is_default: Option<i64> = conn
        .query_row(
            "SELECT is_default
             FROM languages
             WHERE id = ?1
               AND deleted_at IS NULL;",
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(is_default == Some(1))
}

fn required_id(language: &Language) -> RepoResult<i64> {
    language
        .id()
        .ok_or_else(|| RepoError::InvalidData("language has identity but no assigned id".into()))
}

fn language_not_found(id: i64) -> RepoError {
    RepoError::NotFound {
        node_type: "language",
        id: id.to_string(),
    }
}

fn parse_language_row(row: &Row<'_>) -> RepoResult<Language> {
    let is_default = match row.get::<_, i64>("is_default")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_default value `{other}` in languages.is_default"
            )));
        }
    };

    Ok(Language::hydrate(
        row.get("id")?,
        row.get("iso_code")?,
        row.get("culture_name")?,
        is_default,
        row.get("deleted_at")?,
    ))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

//! Container repository: SQLite gateway and tree invariants.
//!
//! # Responsibility
//! - Persist the container hierarchy with materialized path/level columns.
//! - Keep sibling names unique and the tree free of orphans.
//!
//! # Invariants
//! - `path` ends with the node's own id; it is rewritten right after the
//!   insert assigns that id.
//! - Deleting a container re-parents its direct children to the deleted
//!   node's former parent before the node is removed.
//! - Reparenting does not rewrite descendant rows below the direct
//!   children; their materialized path/level stay as persisted.

use crate::cache::policy::CachePolicyKind;
use crate::cache::store::CacheAccess;
use crate::model::container::{Container, ROOT_PARENT_ID};
use crate::model::entity::Entity;
use crate::repo::repository::{EntityGateway, Repository};
use crate::repo::{
    ensure_connection_ready, epoch_ms, sql_placeholders, IntegrityViolation, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior};
use std::sync::Arc;

const CONTAINER_SELECT_SQL: &str = "SELECT
    id,
    parent_id,
    node_type,
    name,
    level,
    path,
    deleted_at
FROM containers";

/// Node type for document grouping containers.
pub const DOCUMENT_CONTAINER: &str = "document-container";

/// Node type for media grouping containers.
pub const MEDIA_CONTAINER: &str = "media-container";

/// Store-side filter for container reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerPredicate {
    /// Direct children of one parent.
    ChildrenOf(i64),
    /// A named node under one parent, matched case-insensitively.
    NamedUnder { parent_id: i64, name: String },
    /// Every node whose materialized path starts with the given chain.
    PathStartsWith(String),
}

/// SQLite-backed gateway for container rows of one node type.
pub struct SqliteContainerGateway<'conn> {
    conn: &'conn Connection,
    node_type: &'static str,
    cache_prefix: String,
}

impl<'conn> SqliteContainerGateway<'conn> {
    pub fn new(conn: &'conn Connection, node_type: &'static str) -> Self {
        Self {
            conn,
            node_type,
            cache_prefix: format!("{node_type}:"),
        }
    }
}

impl EntityGateway for SqliteContainerGateway<'_> {
    type Id = i64;
    type Entity = Container;
    type Predicate = ContainerPredicate;

    fn node_type(&self) -> &'static str {
        self.node_type
    }

    fn cache_prefix(&self) -> &str {
        &self.cache_prefix
    }

    fn fetch_by_id(&self, id: &i64) -> RepoResult<Option<Container>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTAINER_SELECT_SQL}
             WHERE id = ?1
               AND node_type = ?2
               AND deleted_at IS NULL;"
        ))?;
        let mut rows = stmt.query(params![id, self.node_type])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_container_row(row)?));
        }
        Ok(None)
    }

    fn fetch_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Container>> {
        let (sql, bind_values) = if ids.is_empty() {
            (
                format!(
                    "{CONTAINER_SELECT_SQL}
                     WHERE node_type = ?
                       AND deleted_at IS NULL
                     ORDER BY id ASC;"
                ),
                vec![Value::Text(self.node_type.to_string())],
            )
        } else {
            let mut bind_values = vec![Value::Text(self.node_type.to_string())];
            bind_values.extend(ids.iter().map(|id| Value::Integer(*id)));
            (
                format!(
                    "{CONTAINER_SELECT_SQL}
                     WHERE node_type = ?
                       AND id IN {}
                       AND deleted_at IS NULL
                     ORDER BY id ASC;",
                    sql_placeholders(ids.len())
                ),
                bind_values,
            )
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut containers = Vec::new();
        while let Some(row) = rows.next()? {
            containers.push(parse_container_row(row)?);
        }
        Ok(containers)
    }

    fn fetch_by_predicate(&self, predicate: &ContainerPredicate) -> RepoResult<Vec<Container>> {
        let (clause, bind_values) = predicate_clause(predicate);
        let sql = format!(
            "{CONTAINER_SELECT_SQL}
             WHERE node_type = ?
               AND deleted_at IS NULL
               AND {clause}
             ORDER BY name ASC, id ASC;"
        );

        let mut all_values = vec![Value::Text(self.node_type.to_string())];
        all_values.extend(bind_values);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(all_values))?;
        let mut containers = Vec::new();
        while let Some(row) = rows.next()? {
            containers.push(parse_container_row(row)?);
        }
        Ok(containers)
    }

    fn count(&self, predicate: Option<&ContainerPredicate>) -> RepoResult<u64> {
        let (sql, bind_values) = match predicate {
            None => (
                "SELECT COUNT(*) FROM containers WHERE node_type = ? AND deleted_at IS NULL;"
                    .to_string(),
                vec![Value::Text(self.node_type.to_string())],
            ),
            Some(predicate) => {
                let (clause, predicate_values) = predicate_clause(predicate);
                let mut all_values = vec![Value::Text(self.node_type.to_string())];
                all_values.extend(predicate_values);
                (
                    format!(
                        "SELECT COUNT(*)
                         FROM containers
                         WHERE node_type = ?
                           AND deleted_at IS NULL
                           AND {clause};"
                    ),
                    all_values,
                )
            }
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let count: i64 = stmt.query_row(params_from_iter(bind_values), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn persist_new(&self, container: &mut Container) -> RepoResult<()> {
        container.validate()?;
        self.ensure_node_type(container)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let (parent_level, parent_path) =
            resolve_parent(&tx, self.node_type, container.parent_id())?;
        ensure_unique_sibling_name(
            &tx,
            self.node_type,
            container.parent_id(),
            container.name(),
            None,
        )?;

        let level = parent_level + 1;
        let now = epoch_ms();
        tx.execute(
            "INSERT INTO containers (
                parent_id,
                node_type,
                name,
                level,
                path,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, '', ?5, ?5);",
            params![
                container.parent_id(),
                self.node_type,
                container.name(),
                level,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        // The path ends with the node's own id, which exists only now.
        let path = format!("{parent_path},{id}");
        tx.execute(
            "UPDATE containers SET path = ?2 WHERE id = ?1;",
            params![id, path],
        )?;
        tx.commit()?;

        container.assign_id(id);
        container.set_tree_position(level, path);
        container.meta_mut().mark_persisted();
        Ok(())
    }

    fn persist_updated(&self, container: &mut Container) -> RepoResult<()> {
        container.validate()?;
        self.ensure_node_type(container)?;
        let id = required_id(container)?;

        let now = epoch_ms();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if container.meta().is_property_dirty("parent_id") {
            let (parent_level, parent_path) =
                resolve_parent(&tx, self.node_type, container.parent_id())?;
            ensure_unique_sibling_name(
                &tx,
                self.node_type,
                container.parent_id(),
                container.name(),
                Some(id),
            )?;

            let level = parent_level + 1;
            let path = format!("{parent_path},{id}");
            let changed = tx.execute(
                "UPDATE containers
                 SET parent_id = ?2,
                     name = ?3,
                     level = ?4,
                     path = ?5,
                     updated_at = ?6
                 WHERE id = ?1
                   AND node_type = ?7
                   AND deleted_at IS NULL;",
                params![
                    id,
                    container.parent_id(),
                    container.name(),
                    level,
                    path,
                    now,
                    self.node_type,
                ],
            )?;
            if changed == 0 {
                return Err(container_not_found(self.node_type, id));
            }
            // Descendant rows keep their previously materialized path and
            // level.
            container.set_tree_position(level, path);
        } else {
            ensure_unique_sibling_name(
                &tx,
                self.node_type,
                container.parent_id(),
                container.name(),
                Some(id),
            )?;
            let changed = tx.execute(
                "UPDATE containers
                 SET name = ?2,
                     updated_at = ?3
                 WHERE id = ?1
                   AND node_type = ?4
                   AND deleted_at IS NULL;",
                params![id, container.name(), now, self.node_type],
            )?;
            if changed == 0 {
                return Err(container_not_found(self.node_type, id));
            }
        }

        tx.commit()?;
        container.meta_mut().clear_dirty();
        Ok(())
    }

    fn persist_deleted(&self, container: &mut Container) -> RepoResult<()> {
        let id = required_id(container)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let parent_id: Option<i64> = tx
            .query_row(
                "SELECT parent_id
                 FROM containers
                 WHERE id = ?1
                   AND node_type = ?2
                   AND deleted_at IS NULL;",
                params![id, self.node_type],
                |row| row.get(0),
            )
            .optional()?;
        let Some(parent_id) = parent_id else {
            return Err(container_not_found(self.node_type, id));
        };

        let (parent_level, parent_path) = resolve_parent(&tx, self.node_type, parent_id)?;
        let child_ids = list_child_ids(&tx, self.node_type, id)?;

        let now = epoch_ms();
        for child_id in child_ids {
            let child_path = format!("{parent_path},{child_id}");
            tx.execute(
                "UPDATE containers
                 SET parent_id = ?2,
                     level = ?3,
                     path = ?4,
                     updated_at = ?5
                 WHERE id = ?1
                   AND deleted_at IS NULL;",
                params![child_id, parent_id, parent_level + 1, child_path, now],
            )?;
        }

        tx.execute(
            "UPDATE containers
             SET deleted_at = ?2,
                 updated_at = ?2
             WHERE id = ?1
               AND deleted_at IS NULL;",
            params![id, now],
        )?;
        tx.commit()?;

        container.meta_mut().mark_deleted(now);
        Ok(())
    }
}

impl SqliteContainerGateway<'_> {
    fn ensure_node_type(&self, container: &Container) -> RepoResult<()> {
        if container.node_type() != self.node_type {
            return Err(RepoError::InvalidData(format!(
                "container node type `{}` does not match repository `{}`",
                container.node_type(),
                self.node_type
            )));
        }
        Ok(())
    }
}

/// Container repository with per-identifier caching.
pub struct ContainerRepository<'conn> {
    inner: Repository<SqliteContainerGateway<'conn>>,
}

impl<'conn> ContainerRepository<'conn> {
    /// Creates the repository for one node type from a migrated connection
    /// and the cache store resolved for the active scope.
    pub fn try_new(
        conn: &'conn Connection,
        cache: Arc<dyn CacheAccess<Container>>,
        node_type: &'static str,
    ) -> RepoResult<Self> {
        ensure_connection_ready(conn, "containers")?;
        let gateway = SqliteContainerGateway::new(conn, node_type);
        Ok(Self {
            inner: Repository::new(
                gateway,
                cache,
                CachePolicyKind::Default {
                    validate_count: true,
                },
            ),
        })
    }

    pub fn get(&self, id: i64) -> RepoResult<Option<Container>> {
        self.inner.get(&id)
    }

    pub fn get_many(&self, ids: &[i64]) -> RepoResult<Vec<Container>> {
        self.inner.get_many(ids)
    }

    pub fn get_all(&self) -> RepoResult<Vec<Container>> {
        self.inner.get_all()
    }

    pub fn get_by_predicate(&self, predicate: &ContainerPredicate) -> RepoResult<Vec<Container>> {
        self.inner.get_by_predicate(predicate)
    }

    pub fn exists(&self, id: i64) -> RepoResult<bool> {
        self.inner.exists(&id)
    }

    pub fn count(&self, predicate: Option<&ContainerPredicate>) -> RepoResult<u64> {
        self.inner.count(predicate)
    }

    pub fn save(&self, container: &mut Container) -> RepoResult<()> {
        self.inner.save(container)
    }

    pub fn delete(&self, container: &mut Container) -> RepoResult<()> {
        self.inner.delete(container)
    }

    /// Direct children of one parent, straight from the store.
    pub fn get_children(&self, parent_id: i64) -> RepoResult<Vec<Container>> {
        self.inner
            .get_by_predicate(&ContainerPredicate::ChildrenOf(parent_id))
    }
}

fn predicate_clause(predicate: &ContainerPredicate) -> (&'static str, Vec<Value>) {
    match predicate {
        ContainerPredicate::ChildrenOf(parent_id) => {
            ("parent_id = ?", vec![Value::Integer(*parent_id)])
        }
        ContainerPredicate::NamedUnder { parent_id, name } => (
            "parent_id = ? AND name = ? COLLATE NOCASE",
            vec![Value::Integer(*parent_id), Value::Text(name.clone())],
        ),
        ContainerPredicate::PathStartsWith(chain) => {
            ("path LIKE ?", vec![Value::Text(format!("{chain}%"))])
        }
    }
}

fn resolve_parent(
    conn: &Connection,
    node_type: &'static str,
    parent_id: i64,
) -> RepoResult<(i32, String)> {
    if parent_id == ROOT_PARENT_ID {
        return Ok((0, ROOT_PARENT_ID.to_string()));
    }

    conn.query_row(
        "SELECT level, path
         FROM containers
         WHERE id = ?1
           AND node_type = ?2
           AND deleted_at IS NULL;",
        params![parent_id, node_type],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or(RepoError::ReferenceMissing {
        node_type,
        id: parent_id.to_string(),
    })
}

fn ensure_unique_sibling_name(
    conn: &Connection,
    node_type: &'static str,
    parent_id: i64,
    name: &str,
    exclude_id: Option<i64>,
) -> RepoResult<()> {
    let taken: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM containers
            WHERE parent_id = ?1
              AND node_type = ?2
              AND name = ?3 COLLATE NOCASE
              AND deleted_at IS NULL
              AND id <> ?4
        );",
        params![parent_id, node_type, name, exclude_id.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    if taken == 1 {
        return Err(IntegrityViolation::DuplicateSiblingName {
            parent_id,
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

fn list_child_ids(
    conn: &Connection,
    node_type: &'static str,
    parent_id: i64,
) -> RepoResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id
         FROM containers
         WHERE parent_id = ?1
           AND node_type = ?2
           AND deleted_at IS NULL
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query(params![parent_id, node_type])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn required_id(container: &Container) -> RepoResult<i64> {
    container
        .id()
        .ok_or_else(|| RepoError::InvalidData("container has identity but no assigned id".into()))
}

fn container_not_found(node_type: &'static str, id: i64) -> RepoError {
    RepoError::NotFound {
        node_type,
        id: id.to_string(),
    }
}

fn parse_container_row(row: &Row<'_>) -> RepoResult<Container> {
    Ok(Container::hydrate(
        row.get("id")?,
        row.get("parent_id")?,
        row.get("node_type")?,
        row.get("name")?,
        row.get("level")?,
        row.get("path")?,
        row.get("deleted_at")?,
    ))
}

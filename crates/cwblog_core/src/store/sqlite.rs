//! SQLite-backed entity store.
//!
//! # Responsibility
//! - Execute point queries and association loads on one borrowed connection.
//! - Own transaction begin/commit/rollback for every mutation.
//! - Replace association sets with delete-then-upsert semantics.
//!
//! # Invariants
//! - Transactions use `BEGIN IMMEDIATE`, so concurrent writers serialize on
//!   the database lock instead of failing at commit.
//! - A failed transaction body is rolled back before its error is returned.
//! - Association loads are ordered by `sort ASC`, then join-table `rowid`.

use super::record::select_list;
use super::{
    AssociationTable, EntityKind, EntityStore, Key, Record, SchemaMap, StoreError, StoreResult,
    VersionedRecord, WritableRecord,
};
use crate::db::migrations::latest_version;
use crate::model::association::{Association, AssociationEdge, AssociationKind};
use crate::model::EntityId;
use log::{debug, error, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};

/// Rows per upsert statement; keeps bound parameters well below SQLite limits.
const MAX_EDGES_PER_STATEMENT: usize = 300;

/// Row counts reported by one association-set replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Edges deleted before reinsertion.
    pub removed: usize,
    /// Rows inserted or updated by the upsert.
    pub written: usize,
}

/// SQLite entity store over one migrated connection.
pub struct SqliteEntityStore<'conn> {
    conn: &'conn Connection,
    schema: SchemaMap,
}

impl<'conn> SqliteEntityStore<'conn> {
    /// Creates a store after checking that the connection is migrated and
    /// that every table in `schema` exists.
    pub fn try_new(conn: &'conn Connection, schema: SchemaMap) -> StoreResult<Self> {
        ensure_store_connection_ready(conn, &schema)?;
        Ok(Self { conn, schema })
    }

    /// Store with the standard blog association mapping.
    pub fn blog(conn: &'conn Connection) -> StoreResult<Self> {
        Self::try_new(conn, SchemaMap::blog())
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    fn find_by_key<R: Record>(&self, key: &Key) -> StoreResult<Option<R>> {
        find_in(self.conn, key)
    }

    fn exists_by_slug(
        &self,
        kind: EntityKind,
        slug: &str,
        excluding: Option<EntityId>,
    ) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(
                    SELECT 1
                    FROM {table}
                    WHERE {column} = ?1
                      AND (?2 IS NULL OR id <> ?2)
                );",
                table = kind.table(),
                column = kind.natural_key(),
            ),
            params![slug, excluding],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list<R: Record>(&self) -> StoreResult<Vec<R>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY id ASC;",
            select_list::<R>(None),
            R::KIND.table()
        ))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(R::from_row(row)?);
        }
        Ok(records)
    }

    fn count(&self, kind: EntityKind) -> StoreResult<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn load_children<R: Record>(
        &self,
        kind: AssociationKind,
        parent_id: EntityId,
    ) -> StoreResult<Vec<Association<R>>> {
        let table = self.schema.association(kind)?;
        if table.child != R::KIND {
            return Err(StoreError::KindMismatch {
                expected: table.child,
                actual: R::KIND,
            });
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {columns}, j.{sort} AS association_sort
             FROM {child_table} c
             INNER JOIN {join} j ON j.{child_column} = c.id
             WHERE j.{parent_column} = ?1
             ORDER BY j.{sort} ASC, j.rowid ASC;",
            columns = select_list::<R>(Some("c")),
            sort = table.sort_column,
            child_table = table.child.table(),
            join = table.table,
            child_column = table.child_column,
            parent_column = table.parent_column,
        ))?;
        let mut rows = stmt.query([parent_id])?;
        let mut children = Vec::new();
        while let Some(row) = rows.next()? {
            let child = R::from_row(row)?;
            let sort: i64 = row.get("association_sort")?;
            children.push(Association::loaded(child.id(), sort, child));
        }
        Ok(children)
    }

    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let scoped = StoreTx {
            tx,
            schema: &self.schema,
        };

        match f(&scoped) {
            Ok(value) => {
                scoped.tx.commit().map_err(StoreError::from)?;
                debug!("event=tx_commit module=store status=ok");
                Ok(value)
            }
            Err(err) => {
                match scoped.tx.rollback() {
                    Ok(()) => debug!("event=tx_rollback module=store status=ok"),
                    Err(rollback_err) => error!(
                        "event=tx_rollback module=store status=error error={rollback_err}"
                    ),
                }
                Err(err)
            }
        }
    }
}

/// Handle for statements inside one open transaction.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
    schema: &'a SchemaMap,
}

impl StoreTx<'_> {
    pub fn schema(&self) -> &SchemaMap {
        self.schema
    }

    pub fn find_by_key<R: Record>(&self, key: &Key) -> StoreResult<Option<R>> {
        find_in(&self.tx, key)
    }

    /// Inserts `record` and returns its generated id.
    pub fn insert<R: WritableRecord>(&self, record: &R) -> StoreResult<EntityId> {
        record.insert_row(&self.tx)
    }

    /// Updates `record` by id; returns the changed row count (0 when the row
    /// is gone or its version differs from `expected_version`).
    pub fn update<R: VersionedRecord>(
        &self,
        record: &R,
        expected_version: Option<i64>,
    ) -> StoreResult<usize> {
        record.update_row(&self.tx, expected_version)
    }

    /// Deletes one row by id. Association edges cascade in storage.
    pub fn delete(&self, kind: EntityKind, id: EntityId) -> StoreResult<usize> {
        let changed = self.tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", kind.table()),
            [id],
        )?;
        Ok(changed)
    }

    pub fn exists(&self, kind: EntityKind, id: EntityId) -> StoreResult<bool> {
        let exists: i64 = self.tx.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);",
                kind.table()
            ),
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// Replaces every edge of `parent_id` in `table` with `edges`.
    ///
    /// Deletes unconditionally, then inserts the batch with an upsert on the
    /// table's conflict key. Duplicate pairs inside `edges` collapse to one
    /// row; which sort value survives is not part of the contract.
    pub fn replace_association_set(
        &self,
        table: &AssociationTable,
        parent_id: EntityId,
        edges: &[AssociationEdge],
    ) -> StoreResult<ReplaceOutcome> {
        if let Some(foreign) = edges.iter().find(|edge| edge.parent_id != parent_id) {
            return Err(StoreError::InvalidData(format!(
                "edge for parent {} passed to replacement of parent {parent_id} in {}",
                foreign.parent_id, table.table
            )));
        }

        let removed = self.tx.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?1;",
                table.table, table.parent_column
            ),
            [parent_id],
        )?;

        let mut written = 0;
        for chunk in edges.chunks(MAX_EDGES_PER_STATEMENT) {
            written += self.upsert_edges(table, chunk)?;
        }

        Ok(ReplaceOutcome { removed, written })
    }

    fn upsert_edges(&self, table: &AssociationTable, edges: &[AssociationEdge]) -> StoreResult<usize> {
        if edges.is_empty() {
            return Ok(0);
        }

        let (conflict_parent, conflict_child) = table.conflict_key();
        let placeholders = vec!["(?, ?, ?)"; edges.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table} ({parent}, {child}, {sort})
             VALUES {placeholders}
             ON CONFLICT ({conflict_parent}, {conflict_child})
             DO UPDATE SET {sort} = excluded.{sort};",
            table = table.table,
            parent = table.parent_column,
            child = table.child_column,
            sort = table.sort_column,
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(edges.len() * 3);
        for edge in edges {
            bind_values.push(Value::Integer(edge.parent_id));
            bind_values.push(Value::Integer(edge.child_id));
            bind_values.push(Value::Integer(edge.sort));
        }

        let written = self.tx.execute(&sql, params_from_iter(bind_values))?;
        Ok(written)
    }
}

fn find_in<R: Record>(conn: &Connection, key: &Key) -> StoreResult<Option<R>> {
    let (column, value) = match key {
        Key::Id(id) => ("id", Value::Integer(*id)),
        Key::Natural(text) => (R::KIND.natural_key(), Value::Text(text.clone())),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE {column} = ?1;",
        select_list::<R>(None),
        R::KIND.table()
    ))?;
    let mut rows = stmt.query([value])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(R::from_row(row)?));
    }
    Ok(None)
}

fn ensure_store_connection_ready(conn: &Connection, schema: &SchemaMap) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for kind in EntityKind::ALL {
        if !table_exists(conn, kind.table())? {
            return Err(StoreError::MissingRequiredTable(kind.table()));
        }
    }

    for table in schema.associations() {
        if !table_exists(conn, table.table)? {
            warn!(
                "event=store_init module=store status=error association={} table={}",
                table.kind.as_str(),
                table.table
            );
            return Err(StoreError::MissingRequiredTable(table.table));
        }
        for column in table.columns() {
            if !table_has_column(conn, table.table, column)? {
                return Err(StoreError::MissingRequiredColumn {
                    table: table.table,
                    column,
                });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

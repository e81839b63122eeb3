//! Ordered schema migrations for the blog tables.
//!
//! # Responsibility
//! - Register the entity and association-table migrations in version order.
//! - Bring a connection up to the latest schema inside one transaction.
//!
//! # Invariants
//! - `version` values are strictly increasing, starting at 1.
//! - The highest applied version is mirrored to `PRAGMA user_version`.
//! - A failing migration leaves the previous schema and version untouched.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "entities",
        sql: include_str!("0001_entities.sql"),
    },
    Migration {
        version: 2,
        name: "post_associations",
        sql: include_str!("0002_post_associations.sql"),
    },
];

/// Versions applied by one [`apply_migrations`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    apply_from(conn, MIGRATIONS)
}

/// Reads the schema version stored in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn apply_from(conn: &mut Connection, migrations: &[Migration]) -> DbResult<MigrationReport> {
    let from_version = current_user_version(conn)?;
    let latest = migrations.last().map_or(0, |migration| migration.version);
    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        debug!("event=db_migrate module=db status=noop version={from_version}");
        return Ok(MigrationReport {
            from_version,
            to_version: from_version,
            applied: Vec::new(),
        });
    }

    let started_at = Instant::now();
    let tx = conn.transaction()?;
    let mut applied = Vec::with_capacity(pending.len());
    for migration in pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|source| DbError::MigrationFailed {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        debug!(
            "event=db_migration_step module=db version={} name={}",
            migration.version, migration.name
        );
        applied.push(migration.version);
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={from_version} to_version={latest} applied={applied:?} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(MigrationReport {
        from_version,
        to_version: latest,
        applied,
    })
}

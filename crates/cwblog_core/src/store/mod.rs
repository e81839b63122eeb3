//! Entity store contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Provide point lookups, slug existence checks and association loading.
//! - Run multi-statement mutations inside one transaction with full rollback
//!   on failure.
//! - Keep SQL details behind the persistence boundary.
//!
//! # Invariants
//! - Every mutation goes through [`EntityStore::run_in_transaction`].
//! - Transactions never nest; each store borrows exactly one connection.
//! - Association tables are only reachable through the [`SchemaMap`] the store
//!   was constructed with.

use crate::db::DbError;
use crate::model::association::{Association, AssociationKind};
use crate::model::EntityId;
use rusqlite::{ffi, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod record;
mod schema;
mod sqlite;

pub use record::{Record, VersionedRecord, WritableRecord};
pub use schema::{AssociationTable, SchemaMap};
pub use sqlite::{ReplaceOutcome, SqliteEntityStore, StoreTx};

pub type StoreResult<T> = Result<T, StoreError>;

/// Entity tables known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Post,
    Tag,
    Category,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::User, Self::Post, Self::Tag, Self::Category];

    pub fn table(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Post => "posts",
            Self::Tag => "tags",
            Self::Category => "categories",
        }
    }

    /// Unique human-readable key column: `slug`, or `uid` for users.
    pub fn natural_key(self) -> &'static str {
        match self {
            Self::User => "uid",
            Self::Post | Self::Tag | Self::Category => "slug",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Post => "post",
            Self::Tag => "tag",
            Self::Category => "category",
        }
    }
}

/// Lookup key for a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// Primary key.
    Id(EntityId),
    /// Value of [`EntityKind::natural_key`].
    Natural(String),
}

impl Key {
    pub fn slug(value: impl Into<String>) -> Self {
        Self::Natural(value.into())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Natural(value) => write!(f, "key=`{value}`"),
        }
    }
}

/// Persistence error for entity store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A `UNIQUE` or `PRIMARY KEY` constraint rejected the write.
    UniqueViolation(String),
    /// A `FOREIGN KEY` constraint rejected the write.
    ForeignKeyViolation(String),
    /// Target row does not exist.
    NotFound { kind: EntityKind, id: EntityId },
    /// Persisted data cannot be converted into a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Association kind has no table in the store's schema map.
    UnmappedAssociation(AssociationKind),
    /// Record type does not match the association's child kind.
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UniqueViolation(message) => write!(f, "unique constraint violated: {message}"),
            Self::ForeignKeyViolation(message) => {
                write!(f, "foreign key constraint violated: {message}")
            }
            Self::NotFound { kind, id } => write!(f, "{} not found: {id}", kind.label()),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "entity store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "entity store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "entity store requires column `{column}` in table `{table}`"
            ),
            Self::UnmappedAssociation(kind) => {
                write!(f, "association `{}` is not mapped", kind.as_str())
            }
            Self::KindMismatch { expected, actual } => write!(
                f,
                "expected {} records, got {}",
                expected.label(),
                actual.label()
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match constraint_violation(&value) {
            Some((ffi::SQLITE_CONSTRAINT_FOREIGNKEY, message)) => {
                Self::ForeignKeyViolation(message)
            }
            Some((_, message)) => Self::UniqueViolation(message),
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Extended code and message of a unique, primary-key or foreign-key failure.
fn constraint_violation(err: &rusqlite::Error) -> Option<(i32, String)> {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE
                        | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                ) =>
        {
            Some((
                failure.extended_code,
                message.clone().unwrap_or_else(|| failure.to_string()),
            ))
        }
        _ => None,
    }
}

/// Store interface consumed by the resolver and mutation coordinator.
pub trait EntityStore {
    /// Association mapping this store was built with.
    fn schema(&self) -> &SchemaMap;
    /// Loads one row by primary key or natural key.
    fn find_by_key<R: Record>(&self, key: &Key) -> StoreResult<Option<R>>;
    /// Checks whether a row with `slug` exists, ignoring row `excluding`.
    fn exists_by_slug(
        &self,
        kind: EntityKind,
        slug: &str,
        excluding: Option<EntityId>,
    ) -> StoreResult<bool>;
    /// Lists every row of one kind ordered by id.
    fn list<R: Record>(&self) -> StoreResult<Vec<R>>;
    /// Counts rows of one kind.
    fn count(&self, kind: EntityKind) -> StoreResult<i64>;
    /// Loads the association set of one parent, children included.
    ///
    /// Ordered by `sort ASC`, ties by insertion order.
    fn load_children<R: Record>(
        &self,
        kind: AssociationKind,
        parent_id: EntityId,
    ) -> StoreResult<Vec<Association<R>>>;
    /// Runs `f` in one transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back before returning when `f`
    /// fails, so no partial effect is visible to later readers.
    fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>;
}

//! Row mappings between entity tables and domain records.
//!
//! # Invariants
//! - `COLUMNS` lists exactly the columns `from_row` reads, by name.
//! - Read paths reject invalid persisted enum values instead of masking them.
//! - Updates bump `version` and `updated_at`, and only apply when the
//!   expected version (if any) matches.

use super::{EntityKind, StoreError, StoreResult};
use crate::model::category::Category;
use crate::model::post::{Post, PostStatus, Visibility};
use crate::model::tag::Tag;
use crate::model::user::User;
use crate::model::EntityId;
use rusqlite::{params, Connection, Row};

/// A domain record stored in one entity table.
pub trait Record: Sized {
    const KIND: EntityKind;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> EntityId;
    fn from_row(row: &Row<'_>) -> StoreResult<Self>;
}

/// A record the store can insert.
pub trait WritableRecord: Record {
    /// Inserts the record and returns the generated id.
    fn insert_row(&self, conn: &Connection) -> StoreResult<EntityId>;
}

/// A record with a `version` column that the store can update in place.
pub trait VersionedRecord: WritableRecord {
    /// Updates the row with the record's id; returns changed row count.
    fn update_row(&self, conn: &Connection, expected_version: Option<i64>) -> StoreResult<usize>;
}

/// Builds a `SELECT` column list, optionally qualified by a table alias.
pub(crate) fn select_list<R: Record>(alias: Option<&str>) -> String {
    match alias {
        Some(alias) => R::COLUMNS
            .iter()
            .map(|column| format!("{alias}.{column} AS {column}"))
            .collect::<Vec<_>>()
            .join(", "),
        None => R::COLUMNS.join(", "),
    }
}

impl Record for User {
    const KIND: EntityKind = EntityKind::User;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "uid",
        "first_name",
        "last_name",
        "email",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            uid: row.get("uid")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl WritableRecord for User {
    fn insert_row(&self, conn: &Connection) -> StoreResult<EntityId> {
        conn.execute(
            "INSERT INTO users (
                uid,
                first_name,
                last_name,
                email,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                self.uid.as_str(),
                self.first_name.as_str(),
                self.last_name.as_deref(),
                self.email.as_str(),
                self.created_at,
                self.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl Record for Post {
    const KIND: EntityKind = EntityKind::Post;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "title",
        "slug",
        "html",
        "css",
        "status",
        "visibility",
        "format",
        "published_at",
        "version",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        let status_text: String = row.get("status")?;
        let status = PostStatus::parse_db(&status_text).ok_or_else(|| {
            StoreError::InvalidData(format!("invalid post status `{status_text}` in posts.status"))
        })?;

        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            html: row.get("html")?,
            css: row.get("css")?,
            status,
            visibility: parse_visibility(row, "posts.visibility")?,
            format: row.get("format")?,
            published_at: row.get("published_at")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            user: None,
            tags: Vec::new(),
            categories: Vec::new(),
        })
    }
}

impl WritableRecord for Post {
    fn insert_row(&self, conn: &Connection) -> StoreResult<EntityId> {
        conn.execute(
            "INSERT INTO posts (
                user_id,
                title,
                slug,
                html,
                css,
                status,
                visibility,
                format,
                published_at,
                version,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                self.user_id,
                self.title.as_str(),
                self.slug.as_str(),
                self.html.as_deref(),
                self.css.as_deref(),
                self.status.as_db(),
                self.visibility.as_db(),
                self.format.as_str(),
                self.published_at,
                self.version,
                self.created_at,
                self.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl VersionedRecord for Post {
    fn update_row(&self, conn: &Connection, expected_version: Option<i64>) -> StoreResult<usize> {
        let changed = conn.execute(
            "UPDATE posts
             SET
                title = ?2,
                slug = ?3,
                html = ?4,
                css = ?5,
                status = ?6,
                visibility = ?7,
                format = ?8,
                published_at = ?9,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND (?10 IS NULL OR version = ?10);",
            params![
                self.id,
                self.title.as_str(),
                self.slug.as_str(),
                self.html.as_deref(),
                self.css.as_deref(),
                self.status.as_db(),
                self.visibility.as_db(),
                self.format.as_str(),
                self.published_at,
                expected_version,
            ],
        )?;
        Ok(changed)
    }
}

impl Record for Tag {
    const KIND: EntityKind = EntityKind::Tag;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "slug",
        "description",
        "version",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl WritableRecord for Tag {
    fn insert_row(&self, conn: &Connection) -> StoreResult<EntityId> {
        conn.execute(
            "INSERT INTO tags (
                name,
                slug,
                description,
                version,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                self.name.as_str(),
                self.slug.as_str(),
                self.description.as_deref(),
                self.version,
                self.created_at,
                self.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl VersionedRecord for Tag {
    fn update_row(&self, conn: &Connection, expected_version: Option<i64>) -> StoreResult<usize> {
        let changed = conn.execute(
            "UPDATE tags
             SET
                name = ?2,
                slug = ?3,
                description = ?4,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND (?5 IS NULL OR version = ?5);",
            params![
                self.id,
                self.name.as_str(),
                self.slug.as_str(),
                self.description.as_deref(),
                expected_version,
            ],
        )?;
        Ok(changed)
    }
}

impl Record for Category {
    const KIND: EntityKind = EntityKind::Category;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "slug",
        "description",
        "parent_category_id",
        "visibility",
        "version",
        "created_at",
        "updated_at",
    ];

    fn id(&self) -> EntityId {
        self.id
    }

    fn from_row(row: &Row<'_>) -> StoreResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            parent_category_id: row.get("parent_category_id")?,
            visibility: parse_visibility(row, "categories.visibility")?,
            version: row.get("version")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl WritableRecord for Category {
    fn insert_row(&self, conn: &Connection) -> StoreResult<EntityId> {
        conn.execute(
            "INSERT INTO categories (
                name,
                slug,
                description,
                parent_category_id,
                visibility,
                version,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                self.name.as_str(),
                self.slug.as_str(),
                self.description.as_deref(),
                self.parent_category_id,
                self.visibility.as_db(),
                self.version,
                self.created_at,
                self.updated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl VersionedRecord for Category {
    fn update_row(&self, conn: &Connection, expected_version: Option<i64>) -> StoreResult<usize> {
        let changed = conn.execute(
            "UPDATE categories
             SET
                name = ?2,
                slug = ?3,
                description = ?4,
                parent_category_id = ?5,
                visibility = ?6,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND (?7 IS NULL OR version = ?7);",
            params![
                self.id,
                self.name.as_str(),
                self.slug.as_str(),
                self.description.as_deref(),
                self.parent_category_id,
                self.visibility.as_db(),
                expected_version,
            ],
        )?;
        Ok(changed)
    }
}

fn parse_visibility(row: &Row<'_>, column: &'static str) -> StoreResult<Visibility> {
    let value: String = row.get("visibility")?;
    Visibility::parse_db(&value).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid visibility `{value}` in {column}"))
    })
}

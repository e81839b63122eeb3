//! Post domain model.
//!
//! # Responsibility
//! - Define the post record with its owner, tag and category associations.
//! - Build posts from create payloads and merge update payloads.
//!
//! # Invariants
//! - `slug` is stored as sent and unique across posts.
//! - `tags` and `categories` never hold the same child id twice.
//! - A `published` post always has `published_at` set after payload merge.

use super::association::{Association, AssociationKind, AssociationRef};
use super::category::Category;
use super::payload::{require_text, validate_refs, validate_slug, PayloadError, PostPayload};
use super::tag::Tag;
use super::user::User;
use super::{now_epoch_ms, EntityId};
use serde::{Deserialize, Serialize};

const DEFAULT_FORMAT: &str = "post";

/// Editorial state of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    /// Waiting for review.
    Pending,
}

/// Audience of a post or category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to everyone.
    #[default]
    Public,
    /// Only visible to site admins and editors.
    Private,
    /// Only visible with the post password.
    Password,
}

impl PostStatus {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Pending => "pending",
        }
    }

    pub fn parse_db(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

impl Visibility {
    pub fn as_db(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Password => "password",
        }
    }

    pub fn parse_db(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "password" => Some(Self::Password),
            _ => None,
        }
    }
}

/// Canonical post record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Server-generated id. `0` until inserted.
    pub id: EntityId,
    /// Owning user (the actor that created the post).
    pub user_id: EntityId,
    pub title: String,
    pub slug: String,
    pub html: Option<String>,
    pub css: Option<String>,
    pub status: PostStatus,
    pub visibility: Visibility,
    pub format: String,
    /// Unix epoch milliseconds.
    pub published_at: Option<i64>,
    /// Incremented by every committed update.
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Owner row, present when loaded by the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub tags: Vec<Association<Tag>>,
    #[serde(default)]
    pub categories: Vec<Association<Category>>,
}

impl Post {
    /// Builds a not-yet-persisted post from a create payload.
    ///
    /// The owner is assigned separately once the acting identity is resolved.
    pub fn from_payload(payload: PostPayload) -> Result<Self, PayloadError> {
        let now = now_epoch_ms();
        let title = require_text("title", payload.title)?;
        let slug = validate_slug(payload.slug.as_deref().unwrap_or_default())?;
        let tags = checked_refs(AssociationKind::Tags, payload.tags.unwrap_or_default())?;
        let categories = checked_refs(
            AssociationKind::Categories,
            payload.categories.unwrap_or_default(),
        )?;

        let mut post = Self {
            id: 0,
            user_id: 0,
            title,
            slug,
            html: payload.html,
            css: payload.css,
            status: payload.status.unwrap_or_default(),
            visibility: payload.visibility.unwrap_or_default(),
            format: normalize_format(payload.format),
            published_at: payload.published_at,
            version: 1,
            created_at: now,
            updated_at: now,
            user: None,
            tags: tags.into_iter().map(Association::pending).collect(),
            categories: categories.into_iter().map(Association::pending).collect(),
        };
        post.stamp_publication(now);
        Ok(post)
    }

    /// Merges an update payload onto this post.
    ///
    /// Absent fields keep their current value; present association lists
    /// replace the current set.
    pub fn apply(&mut self, payload: PostPayload) -> Result<(), PayloadError> {
        if payload.title.is_some() {
            self.title = require_text("title", payload.title)?;
        }
        if let Some(slug) = payload.slug.as_deref() {
            self.slug = validate_slug(slug)?;
        }
        if let Some(html) = payload.html {
            self.html = Some(html);
        }
        if let Some(css) = payload.css {
            self.css = Some(css);
        }
        if let Some(status) = payload.status {
            self.status = status;
        }
        if let Some(visibility) = payload.visibility {
            self.visibility = visibility;
        }
        if payload.format.is_some() {
            self.format = normalize_format(payload.format);
        }
        if payload.published_at.is_some() {
            self.published_at = payload.published_at;
        }
        if let Some(tags) = payload.tags {
            let tags = checked_refs(AssociationKind::Tags, tags)?;
            self.tags = tags.into_iter().map(Association::pending).collect();
        }
        if let Some(categories) = payload.categories {
            let categories = checked_refs(AssociationKind::Categories, categories)?;
            self.categories = categories.into_iter().map(Association::pending).collect();
        }
        self.stamp_publication(now_epoch_ms());
        Ok(())
    }

    /// Records the owning user.
    pub fn assign_owner(&mut self, owner: &User) {
        self.user_id = owner.id;
        self.user = Some(owner.clone());
    }

    fn stamp_publication(&mut self, now: i64) {
        if self.status == PostStatus::Published && self.published_at.is_none() {
            self.published_at = Some(now);
        }
    }
}

fn checked_refs(
    kind: AssociationKind,
    refs: Vec<AssociationRef>,
) -> Result<Vec<AssociationRef>, PayloadError> {
    validate_refs(kind, &refs)?;
    Ok(refs)
}

fn normalize_format(format: Option<String>) -> String {
    match format {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => DEFAULT_FORMAT.to_string(),
    }
}

//! Parsed request payloads and field validation.
//!
//! # Responsibility
//! - Describe the fields a caller may send for each entity kind.
//! - Validate slugs, required text and child references.
//!
//! # Invariants
//! - Absent fields (`None`) leave the target value unchanged on update.
//! - Slugs are stored exactly as sent and must match `[a-z0-9]+(-[a-z0-9]+)*`.
//! - A child id appears at most once per association list.

use super::association::{AssociationKind, AssociationRef};
use super::post::{PostStatus, Visibility};
use super::EntityId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));

/// Payload validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Required field absent or blank.
    MissingField(&'static str),
    /// Slug does not match the slug grammar.
    InvalidSlug(String),
    /// The same child id appears twice in one association list.
    DuplicateChild {
        kind: AssociationKind,
        child_id: EntityId,
    },
    /// Field present but semantically invalid.
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::InvalidSlug(value) => write!(f, "invalid slug `{value}`"),
            Self::DuplicateChild { kind, child_id } => write!(
                f,
                "duplicate child id {child_id} in `{}` association list",
                kind.as_str()
            ),
            Self::InvalidValue { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for PayloadError {}

/// Create/update payload for posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostPayload {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub html: Option<String>,
    pub css: Option<String>,
    pub status: Option<PostStatus>,
    pub visibility: Option<Visibility>,
    pub format: Option<String>,
    pub published_at: Option<i64>,
    /// Full replacement of the tag set. `None` keeps the current set.
    pub tags: Option<Vec<AssociationRef>>,
    /// Full replacement of the category set. `None` keeps the current set.
    pub categories: Option<Vec<AssociationRef>>,
    /// Expected row version; only checked on update.
    pub version: Option<i64>,
}

/// Create/update payload for tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TagPayload {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub version: Option<i64>,
}

/// Create/update payload for categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CategoryPayload {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// `None`: unchanged, `Some(None)`: detach from parent, `Some(Some(id))`: reparent.
    #[serde(deserialize_with = "present_or_null")]
    pub parent_category_id: Option<Option<EntityId>>,
    pub visibility: Option<Visibility>,
    pub version: Option<i64>,
}

/// Registration payload for users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserPayload {
    pub uid: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Trims `value` and rejects absent or blank input.
pub fn require_text(field: &'static str, value: Option<String>) -> Result<String, PayloadError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(PayloadError::MissingField(field)),
    }
}

/// Checks the slug grammar. The accepted slug is returned unchanged, so
/// lookups by the value the caller sent always match the stored row.
pub fn validate_slug(value: &str) -> Result<String, PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::MissingField("slug"));
    }
    if !SLUG_RE.is_match(value) {
        return Err(PayloadError::InvalidSlug(value.to_string()));
    }
    Ok(value.to_string())
}

/// Rejects association lists that reference the same child twice.
pub fn validate_refs(kind: AssociationKind, refs: &[AssociationRef]) -> Result<(), PayloadError> {
    let mut seen = HashSet::with_capacity(refs.len());
    for reference in refs {
        if !seen.insert(reference.id) {
            return Err(PayloadError::DuplicateChild {
                kind,
                child_id: reference.id,
            });
        }
    }
    Ok(())
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

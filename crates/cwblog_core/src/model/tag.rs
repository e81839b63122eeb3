//! Tag domain model.

use super::payload::{require_text, validate_slug, PayloadError, TagPayload};
use super::{now_epoch_ms, EntityId};
use serde::{Deserialize, Serialize};

/// Canonical tag record.
///
/// Tags are parents in their own CRUD flow and children of posts through
/// `post_tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tag {
    /// Builds a not-yet-persisted tag from a create payload.
    pub fn from_payload(payload: TagPayload) -> Result<Self, PayloadError> {
        let now = now_epoch_ms();
        Ok(Self {
            id: 0,
            name: require_text("name", payload.name)?,
            slug: validate_slug(payload.slug.as_deref().unwrap_or_default())?,
            description: payload.description,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges an update payload; absent fields are kept.
    pub fn apply(&mut self, payload: TagPayload) -> Result<(), PayloadError> {
        if payload.name.is_some() {
            self.name = require_text("name", payload.name)?;
        }
        if let Some(slug) = payload.slug.as_deref() {
            self.slug = validate_slug(slug)?;
        }
        if let Some(description) = payload.description {
            self.description = Some(description);
        }
        Ok(())
    }
}

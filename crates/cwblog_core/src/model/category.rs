//! Category domain model.
//!
//! # Invariants
//! - A category never names itself as its parent.

use super::payload::{require_text, validate_slug, CategoryPayload, PayloadError};
use super::post::Visibility;
use super::{now_epoch_ms, EntityId};
use serde::{Deserialize, Serialize};

/// Canonical category record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Optional parent for nested category trees.
    pub parent_category_id: Option<EntityId>,
    pub visibility: Visibility,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Category {
    /// Builds a not-yet-persisted category from a create payload.
    pub fn from_payload(payload: CategoryPayload) -> Result<Self, PayloadError> {
        let now = now_epoch_ms();
        Ok(Self {
            id: 0,
            name: require_text("name", payload.name)?,
            slug: validate_slug(payload.slug.as_deref().unwrap_or_default())?,
            description: payload.description,
            parent_category_id: payload.parent_category_id.flatten(),
            visibility: payload.visibility.unwrap_or_default(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges an update payload; absent fields are kept.
    pub fn apply(&mut self, payload: CategoryPayload) -> Result<(), PayloadError> {
        if payload.name.is_some() {
            self.name = require_text("name", payload.name)?;
        }
        if let Some(slug) = payload.slug.as_deref() {
            self.slug = validate_slug(slug)?;
        }
        if let Some(description) = payload.description {
            self.description = Some(description);
        }
        if let Some(parent) = payload.parent_category_id {
            if parent == Some(self.id) {
                return Err(PayloadError::InvalidValue {
                    field: "parent_category_id",
                    message: "a category cannot be its own parent".to_string(),
                });
            }
            self.parent_category_id = parent;
        }
        if let Some(visibility) = payload.visibility {
            self.visibility = visibility;
        }
        Ok(())
    }
}

//! Many-to-many association types between posts and their children.
//!
//! # Invariants
//! - An edge is unique on `(parent_id, child_id)`.
//! - `sort` is caller-supplied and not unique; ties keep insertion order.

use super::EntityId;
use serde::{Deserialize, Serialize};

/// Association kinds owned by a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Post -> Tag through `post_tags`.
    Tags,
    /// Post -> Category through `post_categories`.
    Categories,
}

impl AssociationKind {
    /// Stable name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Categories => "categories",
        }
    }
}

/// Child reference as supplied by a request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationRef {
    /// Child entity id.
    pub id: EntityId,
    /// Ordering value. Defaults to 0 when omitted.
    #[serde(default)]
    pub sort: i64,
}

impl AssociationRef {
    pub fn new(id: EntityId, sort: i64) -> Self {
        Self { id, sort }
    }
}

/// One join-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationEdge {
    pub parent_id: EntityId,
    pub child_id: EntityId,
    pub sort: i64,
}

/// Association entry carried on a parent entity.
///
/// `child` is filled when the association was loaded from storage and left
/// empty when the entry only mirrors a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association<T> {
    #[serde(rename = "id")]
    pub child_id: EntityId,
    pub sort: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<T>,
}

impl<T> Association<T> {
    /// Builds an unloaded entry from a payload reference.
    pub fn pending(reference: AssociationRef) -> Self {
        Self {
            child_id: reference.id,
            sort: reference.sort,
            child: None,
        }
    }

    /// Builds a loaded entry.
    pub fn loaded(child_id: EntityId, sort: i64, child: T) -> Self {
        Self {
            child_id,
            sort,
            child: Some(child),
        }
    }

    pub fn to_ref(&self) -> AssociationRef {
        AssociationRef::new(self.child_id, self.sort)
    }
}

/// Collects `(child_id, sort)` pairs, convenient for comparing sets in callers.
pub fn association_pairs<T>(items: &[Association<T>]) -> Vec<(EntityId, i64)> {
    items.iter().map(|item| (item.child_id, item.sort)).collect()
}

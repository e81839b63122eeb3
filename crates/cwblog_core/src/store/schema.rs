//! Explicit association-table mapping.
//!
//! Built once at process start and handed to the store constructor; there is
//! no process-wide registry.

use super::{EntityKind, StoreError, StoreResult};
use crate::model::association::AssociationKind;

/// One join table linking a parent kind to a child kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationTable {
    pub kind: AssociationKind,
    pub parent: EntityKind,
    pub child: EntityKind,
    pub table: &'static str,
    pub parent_column: &'static str,
    pub child_column: &'static str,
    pub sort_column: &'static str,
}

impl AssociationTable {
    /// Columns of the `UNIQUE (parent, child)` constraint used as upsert target.
    pub fn conflict_key(&self) -> (&'static str, &'static str) {
        (self.parent_column, self.child_column)
    }

    pub fn columns(&self) -> [&'static str; 3] {
        [self.parent_column, self.child_column, self.sort_column]
    }
}

/// Association tables known to one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMap {
    associations: Vec<AssociationTable>,
}

impl SchemaMap {
    /// Mapping with no association tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping for the blog schema: `post_tags` and `post_categories`.
    pub fn blog() -> Self {
        Self::new()
            .with_association(AssociationTable {
                kind: AssociationKind::Tags,
                parent: EntityKind::Post,
                child: EntityKind::Tag,
                table: "post_tags",
                parent_column: "post_id",
                child_column: "tag_id",
                sort_column: "sort",
            })
            .with_association(AssociationTable {
                kind: AssociationKind::Categories,
                parent: EntityKind::Post,
                child: EntityKind::Category,
                table: "post_categories",
                parent_column: "post_id",
                child_column: "category_id",
                sort_column: "sort",
            })
    }

    /// Adds or replaces the table for `table.kind`.
    pub fn with_association(mut self, table: AssociationTable) -> Self {
        self.associations.retain(|existing| existing.kind != table.kind);
        self.associations.push(table);
        self
    }

    pub fn association(&self, kind: AssociationKind) -> StoreResult<&AssociationTable> {
        self.associations
            .iter()
            .find(|table| table.kind == kind)
            .ok_or(StoreError::UnmappedAssociation(kind))
    }

    /// Tables owned by `parent`, in registration order.
    pub fn associations_of(
        &self,
        parent: EntityKind,
    ) -> impl Iterator<Item = &AssociationTable> + '_ {
        self.associations
            .iter()
            .filter(move |table| table.parent == parent)
    }

    pub fn associations(&self) -> &[AssociationTable] {
        &self.associations
    }
}

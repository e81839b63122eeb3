//! Collection reads for parent entities.

use super::entity::ParentEntity;
use super::error::BlogError;
use crate::store::EntityStore;

/// Lists parents with their relations loaded.
pub struct Listing<'s, S: EntityStore> {
    store: &'s S,
}

impl<'s, S: EntityStore> Listing<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Every entity of kind `E`, ordered by id.
    pub fn list<E: ParentEntity>(&self) -> Result<Vec<E>, BlogError> {
        let mut entities = self.store.list::<E>()?;
        for entity in &mut entities {
            entity.load_relations(self.store)?;
        }
        Ok(entities)
    }
}

//! Parent-entity behavior shared by the resolver and mutation coordinator.
//!
//! # Responsibility
//! - Bridge request payloads onto records for posts, tags and categories.
//! - Describe which association sets a parent owns and how to load them.

use super::error::BlogError;
use crate::model::association::{Association, AssociationKind, AssociationRef};
use crate::model::category::Category;
use crate::model::payload::{CategoryPayload, PostPayload, TagPayload};
use crate::model::post::Post;
use crate::model::tag::Tag;
use crate::model::user::User;
use crate::model::EntityId;
use crate::store::{EntityKind, EntityStore, Key, StoreResult, StoreTx, VersionedRecord};

/// A record that is the primary resource of a request.
pub trait ParentEntity: VersionedRecord + Clone {
    type Payload;

    /// Validates a create payload into a not-yet-persisted entity.
    fn build(payload: Self::Payload) -> Result<Self, BlogError>;
    /// Merges an update payload; absent fields keep their current value.
    fn merge(&mut self, payload: Self::Payload) -> Result<(), BlogError>;
    /// Row version the caller expects to overwrite, if any.
    fn requested_version(payload: &Self::Payload) -> Option<i64>;
    fn slug(&self) -> &str;
    fn assign_id(&mut self, id: EntityId);

    /// Records the acting user as owner. No-op for unowned kinds.
    fn assign_owner(&mut self, _owner: &User) {}

    /// Desired association sets, one entry per kind this parent owns.
    fn association_sets(&self) -> Vec<(AssociationKind, Vec<AssociationRef>)> {
        Vec::new()
    }

    /// Association kinds an update payload replaces. Kinds left out keep
    /// their stored edges untouched.
    fn requested_associations(_payload: &Self::Payload) -> Vec<AssociationKind> {
        Vec::new()
    }

    /// Checks references to other rows that storage would reject late.
    fn check_references(&self, _tx: &StoreTx<'_>) -> Result<(), BlogError> {
        Ok(())
    }

    /// Loads owner and association sets from storage.
    fn load_relations<S: EntityStore>(&mut self, _store: &S) -> StoreResult<()> {
        Ok(())
    }
}

impl ParentEntity for Post {
    type Payload = PostPayload;

    fn build(payload: PostPayload) -> Result<Self, BlogError> {
        Ok(Post::from_payload(payload)?)
    }

    fn merge(&mut self, payload: PostPayload) -> Result<(), BlogError> {
        Ok(self.apply(payload)?)
    }

    fn requested_version(payload: &PostPayload) -> Option<i64> {
        payload.version
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn assign_owner(&mut self, owner: &User) {
        Post::assign_owner(self, owner);
    }

    fn association_sets(&self) -> Vec<(AssociationKind, Vec<AssociationRef>)> {
        vec![
            (AssociationKind::Tags, refs_of(&self.tags)),
            (AssociationKind::Categories, refs_of(&self.categories)),
        ]
    }

    fn requested_associations(payload: &PostPayload) -> Vec<AssociationKind> {
        let mut kinds = Vec::with_capacity(2);
        if payload.tags.is_some() {
            kinds.push(AssociationKind::Tags);
        }
        if payload.categories.is_some() {
            kinds.push(AssociationKind::Categories);
        }
        kinds
    }

    fn load_relations<S: EntityStore>(&mut self, store: &S) -> StoreResult<()> {
        self.user = store.find_by_key::<User>(&Key::Id(self.user_id))?;
        self.tags = store.load_children::<Tag>(AssociationKind::Tags, self.id)?;
        self.categories = store.load_children::<Category>(AssociationKind::Categories, self.id)?;
        Ok(())
    }
}

impl ParentEntity for Tag {
    type Payload = TagPayload;

    fn build(payload: TagPayload) -> Result<Self, BlogError> {
        Ok(Tag::from_payload(payload)?)
    }

    fn merge(&mut self, payload: TagPayload) -> Result<(), BlogError> {
        Ok(self.apply(payload)?)
    }

    fn requested_version(payload: &TagPayload) -> Option<i64> {
        payload.version
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

impl ParentEntity for Category {
    type Payload = CategoryPayload;

    fn build(payload: CategoryPayload) -> Result<Self, BlogError> {
        Ok(Category::from_payload(payload)?)
    }

    fn merge(&mut self, payload: CategoryPayload) -> Result<(), BlogError> {
        Ok(self.apply(payload)?)
    }

    fn requested_version(payload: &CategoryPayload) -> Option<i64> {
        payload.version
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn check_references(&self, tx: &StoreTx<'_>) -> Result<(), BlogError> {
        let Some(parent_id) = self.parent_category_id else {
            return Ok(());
        };
        if self.id != 0 && parent_id == self.id {
            return Err(BlogError::InvalidRequest(
                "a category cannot be its own parent".to_string(),
            ));
        }
        if !tx.exists(EntityKind::Category, parent_id)? {
            return Err(BlogError::InvalidRequest(format!(
                "parent category {parent_id} does not exist"
            )));
        }
        Ok(())
    }
}

fn refs_of<T>(items: &[Association<T>]) -> Vec<AssociationRef> {
    items.iter().map(Association::to_ref).collect()
}

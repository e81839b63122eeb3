//! Resource resolution by primary key or slug.
//!
//! # Responsibility
//! - Turn path identifiers into one loaded parent entity.
//! - Hand the entity to mutation handlers as a typed [`Resolved`] value.
//!
//! # Invariants
//! - The primary key wins when both identifiers are present.
//! - With neither identifier, resolution fails without touching storage.
//! - Every lookup failure surfaces as `NotFound`; the cause is only logged.

use super::context::{RequestContext, Resolved};
use super::entity::ParentEntity;
use super::error::BlogError;
use crate::store::{EntityStore, Key};
use log::{debug, warn};

/// Identifiers extracted from the request path by the routing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIdentifiers {
    /// Raw primary-key segment; parsed as an integer on resolve.
    pub id: Option<String>,
    pub slug: Option<String>,
}

impl PathIdentifiers {
    pub fn by_id(id: impl ToString) -> Self {
        Self {
            id: Some(id.to_string()),
            slug: None,
        }
    }

    pub fn by_slug(slug: impl Into<String>) -> Self {
        Self {
            id: None,
            slug: Some(slug.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn lookup_key(&self) -> Option<Result<Key, String>> {
        if let Some(raw) = non_blank(self.id.as_deref()) {
            return Some(
                raw.parse::<i64>()
                    .map(Key::Id)
                    .map_err(|_| format!("`{raw}` is not a valid id")),
            );
        }
        non_blank(self.slug.as_deref()).map(|slug| Ok(Key::slug(slug)))
    }
}

/// Read-only resolver over one entity store.
pub struct ResourceResolver<'s, S: EntityStore> {
    store: &'s S,
}

impl<'s, S: EntityStore> ResourceResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Resolves one parent entity with its owner and associations loaded.
    pub fn resolve<E: ParentEntity>(
        &self,
        ctx: RequestContext,
        path: &PathIdentifiers,
    ) -> Result<Resolved<E>, BlogError> {
        let label = E::KIND.label();
        let key = match path.lookup_key() {
            None => {
                debug!(
                    "event=resolve module=resolver status=not_found request_id={} kind={label} reason=no_identifier",
                    ctx.request_id()
                );
                return Err(BlogError::NotFound(format!("{label}: no identifier supplied")));
            }
            Some(Err(reason)) => {
                warn!(
                    "event=resolve module=resolver status=not_found request_id={} kind={label} reason={reason}",
                    ctx.request_id()
                );
                return Err(BlogError::NotFound(format!("{label}: {reason}")));
            }
            Some(Ok(key)) => key,
        };

        match self.load::<E>(&key) {
            Ok(Some(entity)) => {
                debug!(
                    "event=resolve module=resolver status=ok request_id={} kind={label} id={}",
                    ctx.request_id(),
                    entity.id()
                );
                Ok(Resolved::new(ctx, entity))
            }
            Ok(None) => {
                debug!(
                    "event=resolve module=resolver status=not_found request_id={} kind={label} {key}",
                    ctx.request_id()
                );
                Err(BlogError::NotFound(format!("{label} {key}")))
            }
            Err(err) => {
                warn!(
                    "event=resolve module=resolver status=error request_id={} kind={label} {key} error={err}",
                    ctx.request_id()
                );
                Err(BlogError::NotFound(format!("{label} {key}")))
            }
        }
    }

    fn load<E: ParentEntity>(&self, key: &Key) -> crate::store::StoreResult<Option<E>> {
        let Some(mut entity) = self.store.find_by_key::<E>(key)? else {
            return Ok(None);
        };
        entity.load_relations(self.store)?;
        Ok(Some(entity))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

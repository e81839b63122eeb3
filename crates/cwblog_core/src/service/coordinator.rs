//! Create/update/delete orchestration for parent entities.
//!
//! # Responsibility
//! - Validate payloads, resolve the acting user and check slug uniqueness.
//! - Run the row mutation and its association syncs as one transaction.
//! - Create syncs every association kind; update only the kinds its payload lists.
//! - Re-read the canonical entity after updates.
//!
//! # Invariants
//! - A failure at any stage leaves storage unchanged (explicit rollback).
//! - Slug collisions fail with `Conflict` before any write.
//! - An expired or cancelled request is rolled back instead of committed.
//! - Nothing is retried.

use super::context::{ActorId, RequestContext, Resolved};
use super::entity::ParentEntity;
use super::error::BlogError;
use super::sync::AssociationSynchronizer;
use crate::model::association::AssociationKind;
use crate::model::payload::UserPayload;
use crate::model::user::User;
use crate::model::EntityId;
use crate::store::{EntityKind, EntityStore, Key, Record};
use log::{info, warn};
use std::cell::Cell;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Progress of one mutating request. Logged when the request ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStage {
    Validating,
    ResolvingActor,
    Transacting,
    AssociationSync(AssociationKind),
    Committing,
    Rereading,
    Done,
    Aborted,
}

impl Display for MutationStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::ResolvingActor => f.write_str("resolving_actor"),
            Self::Transacting => f.write_str("transacting"),
            Self::AssociationSync(kind) => write!(f, "association_sync:{}", kind.as_str()),
            Self::Committing => f.write_str("committing"),
            Self::Rereading => f.write_str("rereading"),
            Self::Done => f.write_str("done"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Mutation entry point over one entity store.
pub struct MutationCoordinator<'s, S: EntityStore> {
    store: &'s S,
    synchronizer: AssociationSynchronizer,
}

impl<'s, S: EntityStore> MutationCoordinator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            synchronizer: AssociationSynchronizer,
        }
    }

    /// Creates one parent entity owned by the request's actor.
    ///
    /// Returns the in-memory entity with its generated id; associations are
    /// not re-read.
    pub fn create<E: ParentEntity>(
        &self,
        ctx: &RequestContext,
        payload: E::Payload,
    ) -> Result<E, BlogError> {
        let tracker = StageTracker::start("create", E::KIND, Some(ctx.request_id()));
        let result = self.create_inner(ctx, payload, &tracker);
        tracker.finish(result)
    }

    /// Applies `payload` to a resolved entity and returns the re-read row.
    pub fn update<E: ParentEntity>(
        &self,
        resolved: Resolved<E>,
        payload: E::Payload,
    ) -> Result<E, BlogError> {
        let (ctx, stale) = resolved.into_parts();
        let tracker = StageTracker::start("update", E::KIND, Some(ctx.request_id()));
        let result = self.update_inner(&ctx, stale.id(), payload, &tracker);
        tracker.finish(result)
    }

    /// Deletes a resolved entity and returns its pre-deletion snapshot.
    pub fn delete<E: ParentEntity>(&self, resolved: Resolved<E>) -> Result<E, BlogError> {
        let (ctx, snapshot) = resolved.into_parts();
        let tracker = StageTracker::start("delete", E::KIND, Some(ctx.request_id()));
        let result = self.delete_inner(&ctx, snapshot, &tracker);
        tracker.finish(result)
    }

    /// Registers a user row that actor identities can resolve to.
    pub fn register_user(&self, payload: UserPayload) -> Result<User, BlogError> {
        let tracker = StageTracker::start("register", EntityKind::User, None);
        let result = self.register_user_inner(payload, &tracker);
        tracker.finish(result)
    }

    fn create_inner<E: ParentEntity>(
        &self,
        ctx: &RequestContext,
        payload: E::Payload,
        tracker: &StageTracker,
    ) -> Result<E, BlogError> {
        tracker.enter(MutationStage::Validating);
        ctx.ensure_active()?;
        let mut entity = E::build(payload)?;

        tracker.enter(MutationStage::ResolvingActor);
        let owner = self.resolve_actor(ctx)?;
        entity.assign_owner(&owner);

        tracker.enter(MutationStage::Transacting);
        self.ensure_slug_available::<E>(entity.slug(), None)?;

        let id = self.store.run_in_transaction(|tx| {
            entity.check_references(tx)?;
            let id = tx.insert(&entity)?;
            for (kind, refs) in entity.association_sets() {
                tracker.enter(MutationStage::AssociationSync(kind));
                self.synchronizer.synchronize(tx, kind, id, &refs)?;
            }
            tracker.enter(MutationStage::Committing);
            ctx.ensure_active()?;
            Ok::<_, BlogError>(id)
        })?;

        entity.assign_id(id);
        Ok(entity)
    }

    fn update_inner<E: ParentEntity>(
        &self,
        ctx: &RequestContext,
        id: EntityId,
        payload: E::Payload,
        tracker: &StageTracker,
    ) -> Result<E, BlogError> {
        tracker.enter(MutationStage::Validating);
        ctx.ensure_active()?;
        let mut entity = self.load_fresh::<E>(id)?;
        let expected_version = E::requested_version(&payload);
        let replaced = E::requested_associations(&payload);
        entity.merge(payload)?;

        tracker.enter(MutationStage::Transacting);
        self.ensure_slug_available::<E>(entity.slug(), Some(id))?;

        self.store.run_in_transaction(|tx| {
            entity.check_references(tx)?;
            if tx.update(&entity, expected_version)? == 0 {
                if tx.exists(E::KIND, id)? {
                    return Err(BlogError::Conflict(format!(
                        "{} {id} was modified concurrently (expected version {})",
                        E::KIND.label(),
                        expected_version.unwrap_or_default()
                    )));
                }
                return Err(not_found::<E>(id));
            }
            for (kind, refs) in entity.association_sets() {
                if !replaced.contains(&kind) {
                    continue;
                }
                tracker.enter(MutationStage::AssociationSync(kind));
                self.synchronizer.synchronize(tx, kind, id, &refs)?;
            }
            tracker.enter(MutationStage::Committing);
            ctx.ensure_active()?;
            Ok::<_, BlogError>(())
        })?;

        tracker.enter(MutationStage::Rereading);
        self.load_fresh::<E>(id)
    }

    fn delete_inner<E: ParentEntity>(
        &self,
        ctx: &RequestContext,
        snapshot: E,
        tracker: &StageTracker,
    ) -> Result<E, BlogError> {
        tracker.enter(MutationStage::Validating);
        ctx.ensure_active()?;

        tracker.enter(MutationStage::Transacting);
        let id = snapshot.id();
        self.store.run_in_transaction(|tx| {
            if tx.delete(E::KIND, id)? == 0 {
                return Err(not_found::<E>(id));
            }
            tracker.enter(MutationStage::Committing);
            ctx.ensure_active()?;
            Ok::<_, BlogError>(())
        })?;
        Ok(snapshot)
    }

    fn register_user_inner(
        &self,
        payload: UserPayload,
        tracker: &StageTracker,
    ) -> Result<User, BlogError> {
        tracker.enter(MutationStage::Validating);
        let mut user = User::from_payload(payload)?;
        if self
            .store
            .exists_by_slug(EntityKind::User, &user.uid, None)?
        {
            return Err(BlogError::Conflict(format!(
                "user uid `{}` already exists",
                user.uid
            )));
        }

        tracker.enter(MutationStage::Transacting);
        let id = self.store.run_in_transaction(|tx| {
            let id = tx.insert(&user)?;
            tracker.enter(MutationStage::Committing);
            Ok::<_, BlogError>(id)
        })?;
        user.id = id;
        Ok(user)
    }

    fn resolve_actor(&self, ctx: &RequestContext) -> Result<User, BlogError> {
        let key = match ctx.actor() {
            None => {
                return Err(BlogError::InvalidRequest(
                    "an acting user is required".to_string(),
                ))
            }
            Some(ActorId::Uid(uid)) => Key::Natural(uid.clone()),
            Some(ActorId::UserId(id)) => Key::Id(*id),
        };
        self.store
            .find_by_key::<User>(&key)?
            .ok_or_else(|| BlogError::InvalidRequest(format!("unknown actor {key}")))
    }

    fn ensure_slug_available<E: ParentEntity>(
        &self,
        slug: &str,
        excluding: Option<EntityId>,
    ) -> Result<(), BlogError> {
        if self.store.exists_by_slug(E::KIND, slug, excluding)? {
            return Err(BlogError::Conflict(format!(
                "{} slug `{slug}` already exists",
                E::KIND.label()
            )));
        }
        Ok(())
    }

    fn load_fresh<E: ParentEntity>(&self, id: EntityId) -> Result<E, BlogError> {
        let mut entity = self
            .store
            .find_by_key::<E>(&Key::Id(id))?
            .ok_or_else(|| not_found::<E>(id))?;
        entity.load_relations(self.store)?;
        Ok(entity)
    }
}

fn not_found<E: Record>(id: EntityId) -> BlogError {
    BlogError::NotFound(format!("{} {id}", E::KIND.label()))
}

/// Records the current stage and logs the outcome of one mutation.
struct StageTracker {
    operation: &'static str,
    kind: EntityKind,
    request_id: String,
    started_at: Instant,
    stage: Cell<MutationStage>,
}

impl StageTracker {
    fn start(operation: &'static str, kind: EntityKind, request_id: Option<Uuid>) -> Self {
        Self {
            operation,
            kind,
            request_id: request_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            started_at: Instant::now(),
            stage: Cell::new(MutationStage::Validating),
        }
    }

    fn enter(&self, stage: MutationStage) {
        self.stage.set(stage);
    }

    fn finish<T: Record>(&self, result: Result<T, BlogError>) -> Result<T, BlogError> {
        let duration_ms = self.started_at.elapsed().as_millis();
        match &result {
            Ok(entity) => {
                self.enter(MutationStage::Done);
                info!(
                    "event={}_{} module=coordinator status=ok request_id={} id={} stage={} duration_ms={duration_ms}",
                    self.kind.label(),
                    self.operation,
                    self.request_id,
                    entity.id(),
                    self.stage.get()
                );
            }
            Err(err) => {
                let failed_at = self.stage.replace(MutationStage::Aborted);
                warn!(
                    "event={}_{} module=coordinator status=error request_id={} stage={} failed_at={failed_at} error_kind={} error={err} duration_ms={duration_ms}",
                    self.kind.label(),
                    self.operation,
                    self.request_id,
                    self.stage.get(),
                    err.kind().as_str()
                );
            }
        }
        result
    }
}

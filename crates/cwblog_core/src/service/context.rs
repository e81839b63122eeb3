//! Typed per-request state.
//!
//! # Responsibility
//! - Carry request id, acting identity, deadline and cancellation signal.
//! - Carry the resolved parent entity from resolver to mutation handler.
//!
//! # Invariants
//! - A [`Resolved`] value can only be produced by the resolver.
//! - A context is consumed by exactly one resolution (`RequestContext` is not
//!   `Clone`).

use super::error::BlogError;
use crate::config::CoreConfig;
use crate::model::EntityId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Acting identity supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorId {
    /// External identity string stored in `users.uid`.
    Uid(String),
    /// Numeric user id.
    UserId(EntityId),
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State for one inbound request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    actor: Option<ActorId>,
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl RequestContext {
    /// Context without an acting identity.
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor: None,
            deadline: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn for_actor(actor: ActorId) -> Self {
        Self {
            actor: Some(actor),
            ..Self::anonymous()
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Applies the configured default request timeout, if any.
    pub fn with_config(self, config: &CoreConfig) -> Self {
        match config.request_timeout() {
            Some(timeout) => self.with_timeout(timeout),
            None => self,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn actor(&self) -> Option<&ActorId> {
        self.actor.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails when the request was cancelled or its deadline passed.
    pub fn ensure_active(&self) -> Result<(), BlogError> {
        if self.cancel.is_cancelled() {
            return Err(BlogError::InvalidRequest(format!(
                "request {} was cancelled",
                self.request_id
            )));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BlogError::InvalidRequest(format!(
                    "request {} exceeded its deadline",
                    self.request_id
                )));
            }
        }
        Ok(())
    }
}

/// Request context plus the parent entity the resolver loaded for it.
#[derive(Debug)]
pub struct Resolved<E> {
    context: RequestContext,
    entity: E,
}

impl<E> Resolved<E> {
    pub(crate) fn new(context: RequestContext, entity: E) -> Self {
        Self { context, entity }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn entity(&self) -> &E {
        &self.entity
    }

    pub fn into_entity(self) -> E {
        self.entity
    }

    pub fn into_parts(self) -> (RequestContext, E) {
        (self.context, self.entity)
    }
}

//! Core use-case services.
//!
//! # Responsibility
//! - Resolve parent entities from path identifiers.
//! - Orchestrate create/update/delete with association sync as one unit.
//! - Keep transport layers decoupled from storage details.

pub mod context;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod listing;
pub mod resolver;
pub mod sync;

pub use context::{ActorId, CancelToken, RequestContext, Resolved};
pub use coordinator::{MutationCoordinator, MutationStage};
pub use entity::ParentEntity;
pub use error::{BlogError, ErrorKind};
pub use listing::Listing;
pub use resolver::{PathIdentifiers, ResourceResolver};
pub use sync::AssociationSynchronizer;

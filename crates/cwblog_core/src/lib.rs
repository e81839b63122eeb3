//! Core domain logic for the cwblog backend.
//! Resolves posts, tags and categories and keeps their association sets
//! consistent inside single transactions.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::association::{Association, AssociationKind, AssociationRef};
pub use model::category::Category;
pub use model::payload::{CategoryPayload, PayloadError, PostPayload, TagPayload, UserPayload};
pub use model::post::{Post, PostStatus, Visibility};
pub use model::tag::Tag;
pub use model::user::User;
pub use model::EntityId;
pub use service::{
    ActorId, BlogError, CancelToken, ErrorKind, Listing, MutationCoordinator, PathIdentifiers,
    RequestContext, ResourceResolver, Resolved,
};
pub use store::{EntityKind, EntityStore, Key, SchemaMap, SqliteEntityStore, StoreError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

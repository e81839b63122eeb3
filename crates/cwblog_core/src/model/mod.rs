//! Blog domain model: users, posts, tags, categories and their associations.
//!
//! # Responsibility
//! - Define canonical records shared by the store and service layers.
//! - Apply and validate request payloads onto records.
//!
//! # Invariants
//! - Every persisted entity is identified by a server-generated `EntityId`.
//! - Posts, tags and categories carry a unique slug, stored as sent.
//! - Association lists hold at most one entry per child id.

pub mod association;
pub mod category;
pub mod payload;
pub mod post;
pub mod tag;
pub mod user;

use std::time::{SystemTime, UNIX_EPOCH};

/// Server-generated primary key shared by every entity table.
pub type EntityId = i64;

/// Current wall-clock time in Unix epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

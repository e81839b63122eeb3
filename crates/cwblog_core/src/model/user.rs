//! User domain model.
//!
//! Users are the rows acting identities resolve to; posts reference their
//! owner through `user_id`.

use super::payload::{require_text, PayloadError, UserPayload};
use super::{now_epoch_ms, EntityId};
use serde::{Deserialize, Serialize};

/// Canonical user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    /// External identity issued by the authentication layer.
    pub uid: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Builds a not-yet-persisted user from a registration payload.
    pub fn from_payload(payload: UserPayload) -> Result<Self, PayloadError> {
        let now = now_epoch_ms();
        let email = require_text("email", payload.email)?;
        if !email.contains('@') {
            return Err(PayloadError::InvalidValue {
                field: "email",
                message: format!("`{email}` is not an email address"),
            });
        }

        Ok(Self {
            id: 0,
            uid: require_text("uid", payload.uid)?,
            first_name: require_text("first_name", payload.first_name)?,
            last_name: payload.last_name.filter(|value| !value.trim().is_empty()),
            email,
            created_at: now,
            updated_at: now,
        })
    }
}

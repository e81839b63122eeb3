//! Use-case error surface.
//!
//! # Invariants
//! - Every failure maps to exactly one [`ErrorKind`].
//! - Storage failures that are not constraint violations report
//!   `InvalidRequest`; transport mapping is left to the caller.

use crate::model::payload::PayloadError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Coarse failure class exposed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
        }
    }
}

/// Service error for resolve and mutation use-cases.
#[derive(Debug)]
pub enum BlogError {
    /// Payload, actor or request state rejected.
    InvalidRequest(String),
    /// Target entity could not be resolved.
    NotFound(String),
    /// Slug collision, duplicate key or stale version.
    Conflict(String),
    /// Persistence-layer failure.
    Store(StoreError),
}

impl BlogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::Store(_) => ErrorKind::InvalidRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

impl Display for BlogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BlogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for BlogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UniqueViolation(message) => Self::Conflict(message),
            StoreError::ForeignKeyViolation(message) => {
                Self::InvalidRequest(format!("unknown referenced entity ({message})"))
            }
            StoreError::NotFound { kind, id } => Self::NotFound(format!("{} {id}", kind.label())),
            other => Self::Store(other),
        }
    }
}

impl From<PayloadError> for BlogError {
    fn from(value: PayloadError) -> Self {
        Self::InvalidRequest(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{BlogError, ErrorKind};
    use crate::model::payload::PayloadError;
    use crate::store::{EntityKind, StoreError};

    #[test]
    fn store_errors_map_to_kinds() {
        let conflict = BlogError::from(StoreError::UniqueViolation("tags.slug".to_string()));
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let missing = BlogError::from(StoreError::NotFound {
            kind: EntityKind::Post,
            id: 7,
        });
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing.to_string(), "not found: post 7");

        let other = BlogError::from(StoreError::InvalidData("bad".to_string()));
        assert!(matches!(other, BlogError::Store(_)));
        assert_eq!(other.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn payload_errors_are_invalid_requests() {
        let err = BlogError::from(PayloadError::MissingField("title"));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "invalid request: missing required field `title`");
    }
}

use crate::types::PrincipalId;
use std::fmt;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reference to the entity an error is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    /// Entity kind tag, e.g. `project` or `invitation`.
    pub kind: &'static str,
    /// Display identifier of the entity.
    pub id: String,
}

impl EntityRef {
    /// Creates an entity reference.
    pub fn new(kind: &'static str, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller carries no authenticated principal.
    #[error("caller is not authenticated")]
    Unauthenticated,
    /// The principal is not allowed to act on the entity.
    #[error("permission denied for {principal} on {entity}")]
    PermissionDenied {
        principal: PrincipalId,
        entity: EntityRef,
    },
    /// The entity does not exist or is no longer active.
    #[error("{entity} not found")]
    NotFound { entity: EntityRef },
    /// A uniqueness invariant would be violated.
    #[error("conflict on {entity}: {reason}")]
    Conflict { entity: EntityRef, reason: String },
    /// A time-bounded credential is past its expiry.
    #[error("{entity} has expired")]
    Expired { entity: EntityRef },
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Missing or malformed field input.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: EntityRef::new(kind, id),
        }
    }

    pub(crate) fn denied(
        principal: &PrincipalId,
        kind: &'static str,
        id: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            principal: principal.clone(),
            entity: EntityRef::new(kind, id),
        }
    }

    pub(crate) fn conflict(
        kind: &'static str,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity: EntityRef::new(kind, id),
            reason: reason.into(),
        }
    }

    pub(crate) fn expired(kind: &'static str, id: impl Into<String>) -> Self {
        Self::Expired {
            entity: EntityRef::new(kind, id),
        }
    }
}

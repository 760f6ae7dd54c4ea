//! Ownership model and the access predicate applied to every resource
//! read, update, and delete.

use crate::types::PrincipalId;
use serde::{Deserialize, Serialize};

/// Who owns a resource.
///
/// `Unclaimed` marks rows that predate ownership tracking. Under
/// [`AccessMode::LegacyOpen`] they stay accessible to any authenticated
/// principal until an operator runs the claim migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    /// Owned by one principal; mutation is restricted to that principal.
    Owned(PrincipalId),
    /// Legacy row with no recorded owner.
    Unclaimed,
}

impl Ownership {
    /// Returns the owning principal, if any.
    pub fn owner(&self) -> Option<&PrincipalId> {
        match self {
            Self::Owned(principal) => Some(principal),
            Self::Unclaimed => None,
        }
    }
}

/// Guarded operation on an owned resource.
///
/// Creation is absent on purpose: the creator always becomes the owner, so
/// there is nothing to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Update,
    Delete,
}

/// Policy for unclaimed legacy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Unclaimed resources are open to any authenticated principal.
    /// Backward-compatible default.
    #[default]
    LegacyOpen,
    /// Unclaimed resources are inaccessible until claimed.
    Strict,
}

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Access is granted.
    Allow,
    /// Access is denied.
    Deny,
}

/// Resolves whether `principal` may perform `operation` on a resource with
/// the given ownership. Pure; the caller is responsible for acting on the
/// decision before any mutation.
pub fn resolve(
    mode: AccessMode,
    principal: &PrincipalId,
    ownership: &Ownership,
    _operation: Operation,
) -> Decision {
    match ownership {
        Ownership::Owned(owner) if owner == principal => Decision::Allow,
        Ownership::Owned(_) => Decision::Deny,
        Ownership::Unclaimed => match mode {
            AccessMode::LegacyOpen => Decision::Allow,
            AccessMode::Strict => Decision::Deny,
        },
    }
}

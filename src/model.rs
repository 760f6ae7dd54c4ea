//! Domain records shared by the engine and the store seam.

use crate::error::{Error, Result};
use crate::ownership::Ownership;
use crate::types::{EmailAddress, InvitationToken, OrgId, PermissionName, PrincipalId, ResourceId, RoleName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated actor, as resolved by the external session layer.
///
/// The engine never creates principals; it only consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: EmailAddress,
}

impl Principal {
    /// Creates a principal from session-layer attributes.
    pub fn new(id: PrincipalId, email: EmailAddress) -> Self {
        Self { id, email }
    }
}

/// Caller identity injected per call by the session layer.
#[derive(Debug, Clone)]
pub enum Caller {
    /// A resolved, authenticated principal.
    Authenticated(Principal),
    /// No principal; every guarded operation fails `Unauthenticated`.
    Anonymous,
}

impl Caller {
    /// Wraps an authenticated principal.
    pub fn authenticated(principal: Principal) -> Self {
        Self::Authenticated(principal)
    }

    /// An anonymous caller.
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Returns the principal, if any.
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(principal) => Some(principal),
            Self::Anonymous => None,
        }
    }

    pub(crate) fn require(&self) -> Result<&Principal> {
        self.principal().ok_or(Error::Unauthenticated)
    }
}

/// Kind of an owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Project,
    Asset,
    Layer,
}

impl ResourceKind {
    /// Static tag used in entity references and audit rows.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Asset => "asset",
            Self::Layer => "layer",
        }
    }

    /// Whether this kind must hang off a project.
    pub fn requires_parent(self) -> bool {
        !matches!(self, Self::Project)
    }
}

/// An owned resource row.
///
/// `payload` is opaque to the engine: geometry, properties, and custom-field
/// values belong to the external editing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub name: String,
    pub owner: Ownership,
    pub parent: Option<ResourceId>,
    pub payload: serde_json::Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDraft {
    pub kind: ResourceKind,
    pub name: String,
    pub parent: Option<ResourceId>,
    pub payload: serde_json::Value,
}

/// Fields that can be updated on an existing resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub payload: Option<serde_json::Value>,
}

/// A named, assignable bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: RoleName,
    pub display_name: String,
    /// System-reserved roles cannot be retired by operators.
    pub system: bool,
    pub active: bool,
}

/// An atomic capability checked before a privileged action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub name: PermissionName,
    pub category: String,
    pub active: bool,
}

/// Principal-to-role assignment with optional expiry.
///
/// Unique per (principal, role). Revocation deactivates the row, it never
/// deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal: PrincipalId,
    pub role: RoleName,
    pub assigned_by: PrincipalId,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl RoleAssignment {
    /// Whether the assignment itself is live at `now`.
    ///
    /// The role's own active flag is checked separately by the engine.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// One resolved permission together with the role that granted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: PermissionName,
    pub role: RoleName,
}

/// An organization grouping principals under shared membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: OrgId,
    pub name: String,
    /// URL-safe unique identifier (e.g. `acme-corp`).
    pub slug: String,
    pub settings: serde_json::Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Organization membership row. Unique per (organization, principal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub org: OrgId,
    pub principal: PrincipalId,
    pub role: RoleName,
    pub invited_by: Option<PrincipalId>,
    pub joined_at: DateTime<Utc>,
    pub active: bool,
}

/// A single-use, time-bounded membership invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationRecord {
    pub org: OrgId,
    pub email: EmailAddress,
    pub role: RoleName,
    pub invited_by: PrincipalId,
    pub token: InvitationToken,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl InvitationRecord {
    /// Whether the invitation is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the token has already been consumed.
    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    /// Whether the invitation can still be accepted at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.is_accepted() && !self.is_expired(now)
    }
}

/// Outcome of a cascading project deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// True when the project row was soft-deleted; false means the hard
    /// fallback removed the row.
    pub soft_deleted: bool,
    pub assets_deleted: usize,
    pub layers_deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn assignment(expires_at: Option<DateTime<Utc>>, active: bool) -> RoleAssignment {
        RoleAssignment {
            principal: PrincipalId::from_string("user_1".to_string()),
            role: RoleName::from_string("admin".to_string()),
            assigned_by: PrincipalId::from_string("root".to_string()),
            assigned_at: Utc::now(),
            expires_at,
            active,
        }
    }

    #[test]
    fn assignment_without_expiry_is_effective() {
        let now = Utc::now();
        assert!(assignment(None, true).is_effective(now));
    }

    #[test]
    fn assignment_past_expiry_is_not_effective() {
        let now = Utc::now();
        assert!(!assignment(Some(now - Duration::seconds(1)), true).is_effective(now));
    }

    #[test]
    fn inactive_assignment_is_not_effective() {
        let now = Utc::now();
        assert!(!assignment(None, false).is_effective(now));
    }

    #[test]
    fn invitation_open_only_before_expiry_and_acceptance() {
        let now = Utc::now();
        let mut invitation = InvitationRecord {
            org: OrgId::from_string("org_1".to_string()),
            email: EmailAddress::from_string("b@x.com".to_string()),
            role: RoleName::from_string("member".to_string()),
            invited_by: PrincipalId::from_string("user_a".to_string()),
            token: InvitationToken::generate(),
            expires_at: now + Duration::days(7),
            accepted_at: None,
        };
        assert!(invitation.is_open(now));

        invitation.accepted_at = Some(now);
        assert!(!invitation.is_open(now));

        invitation.accepted_at = None;
        invitation.expires_at = now - Duration::seconds(1);
        assert!(!invitation.is_open(now));
    }

    #[test]
    fn anonymous_caller_fails_require() {
        assert!(Caller::anonymous().require().is_err());
    }
}

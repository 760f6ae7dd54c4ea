use crate::audit::{AuditEntry, AuditFilter};
use crate::error::StoreError;
use crate::model::{
    CascadeReport, InvitationRecord, MembershipRecord, OrganizationRecord, PermissionRecord,
    ResourceRecord, RoleAssignment, RoleRecord,
};
use crate::ownership::Ownership;
use crate::types::{EmailAddress, InvitationToken, OrgId, PrincipalId, ResourceId, RoleName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of the atomic project-tree deletion step.
///
/// The store re-verifies liveness and ownership inside its own transaction,
/// so the engine's pre-check and the mutation cannot be separated by a
/// concurrent writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeOutcome {
    /// No active project row exists.
    Missing,
    /// Ownership changed between authorization and commit.
    OwnerChanged,
    /// The tree was deleted.
    Deleted(CascadeReport),
}

/// Result of the atomic invitation-acceptance step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The invitation was consumed and the membership upserted.
    Accepted(MembershipRecord),
    /// The token was already consumed.
    AlreadyAccepted,
    /// The invitation is past its expiry.
    Expired,
    /// No invitation exists for the token.
    Missing,
}

/// Store interface for owned resources.
#[async_trait]
pub trait ResourceStore {
    /// Inserts a new resource row.
    async fn insert_resource(&self, record: ResourceRecord) -> Result<(), StoreError>;

    /// Fetches a resource by id, active or not.
    async fn fetch_resource(
        &self,
        id: ResourceId,
    ) -> Result<Option<ResourceRecord>, StoreError>;

    /// Replaces a resource row. Returns false when no row exists.
    async fn update_resource(&self, record: ResourceRecord) -> Result<bool, StoreError>;

    /// Lists direct children of a project, active or not.
    async fn list_children(
        &self,
        project: ResourceId,
    ) -> Result<Vec<ResourceRecord>, StoreError>;

    /// Atomically deletes a project together with its in-scope children.
    ///
    /// Children are soft-deleted when their owner is `scope_owner` or the row
    /// is unclaimed. The project is soft-deleted, falling back to hard
    /// removal if the soft delete is rejected. `authorized_owner` is the
    /// ownership observed at authorization time; a mismatch at commit time
    /// aborts the whole step.
    async fn delete_project_tree(
        &self,
        project: ResourceId,
        authorized_owner: Ownership,
        scope_owner: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<CascadeOutcome, StoreError>;

    /// Atomically assigns `new_owner` to every unclaimed resource.
    /// Returns the number of rows claimed.
    async fn claim_unclaimed(
        &self,
        new_owner: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Store interface for roles, permissions, and assignments.
#[async_trait]
pub trait RoleStore {
    /// Fetches a role by name.
    async fn fetch_role(&self, role: RoleName) -> Result<Option<RoleRecord>, StoreError>;

    /// Returns the permissions granted to a role, including inactive ones.
    async fn role_grants(&self, role: RoleName) -> Result<Vec<PermissionRecord>, StoreError>;

    /// Fetches the assignment row for a (principal, role) pair.
    async fn assignment(
        &self,
        principal: PrincipalId,
        role: RoleName,
    ) -> Result<Option<RoleAssignment>, StoreError>;

    /// Returns every assignment row for a principal, active or not.
    async fn assignments_for(
        &self,
        principal: PrincipalId,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    /// Inserts or replaces the assignment row keyed on (principal, role).
    async fn upsert_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError>;

    /// Marks an assignment inactive, keeping the row. Returns false when no
    /// row exists.
    async fn deactivate_assignment(
        &self,
        principal: PrincipalId,
        role: RoleName,
    ) -> Result<bool, StoreError>;
}

/// Store interface for organizations, memberships, and invitations.
#[async_trait]
pub trait OrganizationStore {
    /// Inserts an organization. Returns false when the slug is taken.
    async fn insert_org(&self, record: OrganizationRecord) -> Result<bool, StoreError>;

    /// Fetches an organization by id.
    async fn fetch_org(&self, org: OrgId) -> Result<Option<OrganizationRecord>, StoreError>;

    /// Returns the open (unaccepted, unexpired) invitation for an
    /// (organization, email) pair, if any.
    async fn open_invitation(
        &self,
        org: OrgId,
        email: EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationRecord>, StoreError>;

    /// Inserts an invitation row.
    async fn insert_invitation(&self, record: InvitationRecord) -> Result<(), StoreError>;

    /// Fetches an invitation by token.
    async fn fetch_invitation(
        &self,
        token: InvitationToken,
    ) -> Result<Option<InvitationRecord>, StoreError>;

    /// Atomically consumes an invitation token and upserts the membership.
    ///
    /// An existing membership row keeps its `joined_at` and `invited_by`; the
    /// role is refreshed from the invitation and the row re-activated.
    async fn accept_invitation(
        &self,
        token: InvitationToken,
        membership: MembershipRecord,
        now: DateTime<Utc>,
    ) -> Result<AcceptOutcome, StoreError>;

    /// Fetches the membership row for an (organization, principal) pair.
    async fn membership(
        &self,
        org: OrgId,
        principal: PrincipalId,
    ) -> Result<Option<MembershipRecord>, StoreError>;

    /// Inserts or replaces a membership row keyed on (organization, principal).
    async fn upsert_membership(&self, record: MembershipRecord) -> Result<(), StoreError>;
}

/// Store interface for the append-only audit log.
#[async_trait]
pub trait AuditStore {
    /// Appends an entry. Entries are never updated or deleted.
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Returns entries matching the filter, most recent first.
    async fn query_audit(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Composite store trait.
pub trait Store:
    ResourceStore + RoleStore + OrganizationStore + AuditStore + Send + Sync
{
}

impl<T> Store for T where
    T: ResourceStore + RoleStore + OrganizationStore + AuditStore + Send + Sync
{
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{AuditEntry, AuditFilter};
use crate::error::StoreError;
use crate::model::{
    CascadeReport, InvitationRecord, MembershipRecord, OrganizationRecord, PermissionRecord,
    ResourceKind, ResourceRecord, RoleAssignment, RoleRecord,
};
use crate::ownership::Ownership;
use crate::store::{
    AcceptOutcome, AuditStore, CascadeOutcome, OrganizationStore, ResourceStore, RoleStore,
};
use crate::types::{EmailAddress, InvitationToken, OrgId, PermissionName, PrincipalId, ResourceId, RoleName};

/// In-memory store implementation for tests and demos.
///
/// All state sits behind one lock, so every store call is a single atomic
/// unit, matching the transactional contract of the seam.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<ResourceId, ResourceRecord>,
    roles: HashMap<RoleName, RoleRecord>,
    permissions: HashMap<PermissionName, PermissionRecord>,
    grants: HashMap<RoleName, HashSet<PermissionName>>,
    assignments: HashMap<(PrincipalId, RoleName), RoleAssignment>,
    orgs: HashMap<OrgId, OrganizationRecord>,
    memberships: HashMap<(OrgId, PrincipalId), MembershipRecord>,
    invitations: HashMap<InvitationToken, InvitationRecord>,
    audit: Vec<AuditEntry>,
    soft_delete_faults: HashSet<ResourceId>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or replaces a role.
    pub fn define_role(&self, role: RoleRecord) {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.roles.insert(role.name.clone(), role);
    }

    /// Defines or replaces a permission.
    pub fn define_permission(&self, permission: PermissionRecord) {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.permissions.insert(permission.name.clone(), permission);
    }

    /// Grants a permission to a role.
    pub fn grant(&self, role: RoleName, permission: PermissionName) {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.grants.entry(role).or_default().insert(permission);
    }

    /// Seeds a resource row directly, bypassing the engine. Intended for
    /// legacy (unclaimed) fixtures.
    pub fn seed_resource(&self, record: ResourceRecord) {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.resources.insert(record.id.clone(), record);
    }

    /// Makes the next soft delete of `id` fail, forcing the hard fallback.
    pub fn set_soft_delete_fault(&self, id: ResourceId) {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.soft_delete_faults.insert(id);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert_resource(&self, record: ResourceRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.resources.insert(record.id.clone(), record);
        Ok(())
    }

    async fn fetch_resource(
        &self,
        id: ResourceId,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.resources.get(&id).cloned())
    }

    async fn update_resource(&self, record: ResourceRecord) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        if !guard.resources.contains_key(&record.id) {
            return Ok(false);
        }
        guard.resources.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn list_children(
        &self,
        project: ResourceId,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard
            .resources
            .values()
            .filter(|record| record.parent.as_ref() == Some(&project))
            .cloned()
            .collect())
    }

    async fn delete_project_tree(
        &self,
        project: ResourceId,
        authorized_owner: Ownership,
        scope_owner: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<CascadeOutcome, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");

        let Some(current) = guard.resources.get(&project) else {
            return Ok(CascadeOutcome::Missing);
        };
        if !current.active {
            return Ok(CascadeOutcome::Missing);
        }
        if current.owner != authorized_owner {
            return Ok(CascadeOutcome::OwnerChanged);
        }

        let mut assets_deleted = 0;
        let mut layers_deleted = 0;
        for child in guard.resources.values_mut() {
            if child.parent.as_ref() != Some(&project) || !child.active {
                continue;
            }
            let in_scope = match &child.owner {
                Ownership::Owned(owner) => *owner == scope_owner,
                Ownership::Unclaimed => true,
            };
            if !in_scope {
                continue;
            }
            child.active = false;
            child.updated_at = now;
            match child.kind {
                ResourceKind::Asset => assets_deleted += 1,
                ResourceKind::Layer => layers_deleted += 1,
                ResourceKind::Project => {}
            }
        }

        let soft_deleted = if guard.soft_delete_faults.remove(&project) {
            guard.resources.remove(&project);
            false
        } else if let Some(row) = guard.resources.get_mut(&project) {
            row.active = false;
            row.updated_at = now;
            true
        } else {
            false
        };

        Ok(CascadeOutcome::Deleted(CascadeReport {
            soft_deleted,
            assets_deleted,
            layers_deleted,
        }))
    }

    async fn claim_unclaimed(
        &self,
        new_owner: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        let mut claimed = 0;
        for record in guard.resources.values_mut() {
            if record.owner == Ownership::Unclaimed {
                record.owner = Ownership::Owned(new_owner.clone());
                record.updated_at = now;
                claimed += 1;
            }
        }
        Ok(claimed)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn fetch_role(&self, role: RoleName) -> Result<Option<RoleRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.roles.get(&role).cloned())
    }

    async fn role_grants(&self, role: RoleName) -> Result<Vec<PermissionRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        let Some(granted) = guard.grants.get(&role) else {
            return Ok(Vec::new());
        };
        Ok(granted
            .iter()
            .filter_map(|name| guard.permissions.get(name))
            .cloned()
            .collect())
    }

    async fn assignment(
        &self,
        principal: PrincipalId,
        role: RoleName,
    ) -> Result<Option<RoleAssignment>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.assignments.get(&(principal, role)).cloned())
    }

    async fn assignments_for(
        &self,
        principal: PrincipalId,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard
            .assignments
            .values()
            .filter(|assignment| assignment.principal == principal)
            .cloned()
            .collect())
    }

    async fn upsert_assignment(&self, assignment: RoleAssignment) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.assignments.insert(
            (assignment.principal.clone(), assignment.role.clone()),
            assignment,
        );
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        principal: PrincipalId,
        role: RoleName,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        match guard.assignments.get_mut(&(principal, role)) {
            Some(assignment) => {
                assignment.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn insert_org(&self, record: OrganizationRecord) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        if guard.orgs.values().any(|org| org.slug == record.slug) {
            return Ok(false);
        }
        guard.orgs.insert(record.id.clone(), record);
        Ok(true)
    }

    async fn fetch_org(&self, org: OrgId) -> Result<Option<OrganizationRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.orgs.get(&org).cloned())
    }

    async fn open_invitation(
        &self,
        org: OrgId,
        email: EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard
            .invitations
            .values()
            .find(|invitation| {
                invitation.org == org && invitation.email == email && invitation.is_open(now)
            })
            .cloned())
    }

    async fn insert_invitation(&self, record: InvitationRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.invitations.insert(record.token.clone(), record);
        Ok(())
    }

    async fn fetch_invitation(
        &self,
        token: InvitationToken,
    ) -> Result<Option<InvitationRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.invitations.get(&token).cloned())
    }

    async fn accept_invitation(
        &self,
        token: InvitationToken,
        membership: MembershipRecord,
        now: DateTime<Utc>,
    ) -> Result<AcceptOutcome, StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");

        {
            let Some(invitation) = guard.invitations.get_mut(&token) else {
                return Ok(AcceptOutcome::Missing);
            };
            if invitation.accepted_at.is_some() {
                return Ok(AcceptOutcome::AlreadyAccepted);
            }
            if invitation.expires_at <= now {
                return Ok(AcceptOutcome::Expired);
            }
            invitation.accepted_at = Some(now);
        }

        let key = (membership.org.clone(), membership.principal.clone());
        let record = if let Some(existing) = guard.memberships.get(&key) {
            MembershipRecord {
                joined_at: existing.joined_at,
                invited_by: existing.invited_by.clone(),
                active: true,
                ..membership
            }
        } else {
            membership
        };
        guard.memberships.insert(key, record.clone());
        Ok(AcceptOutcome::Accepted(record))
    }

    async fn membership(
        &self,
        org: OrgId,
        principal: PrincipalId,
    ) -> Result<Option<MembershipRecord>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        Ok(guard.memberships.get(&(org, principal)).cloned())
    }

    async fn upsert_membership(&self, record: MembershipRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard
            .memberships
            .insert((record.org.clone(), record.principal.clone()), record);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        let mut guard = self.inner.write().expect("poisoned lock");
        guard.audit.push(entry);
        Ok(())
    }

    async fn query_audit(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let guard = self.inner.read().expect("poisoned lock");
        let mut entries: Vec<AuditEntry> = guard
            .audit
            .iter()
            .rev()
            .filter(|entry| {
                filter
                    .principal
                    .as_ref()
                    .is_none_or(|principal| entry.principal.as_ref() == Some(principal))
            })
            .filter(|entry| {
                filter
                    .action
                    .as_deref()
                    .is_none_or(|action| entry.action == action)
            })
            .filter(|entry| {
                filter
                    .resource_type
                    .as_deref()
                    .is_none_or(|kind| entry.resource_type == kind)
            })
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn principal(value: &str) -> PrincipalId {
        PrincipalId::from_string(value.to_string())
    }

    fn resource(id: &str, kind: ResourceKind, owner: Ownership, parent: Option<&str>) -> ResourceRecord {
        let now = Utc::now();
        ResourceRecord {
            id: ResourceId::from_string(id.to_string()),
            kind,
            name: id.to_string(),
            owner,
            parent: parent.map(|p| ResourceId::from_string(p.to_string())),
            payload: json!({}),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn delete_project_tree_aborts_when_owner_changed() {
        let store = MemoryStore::new();
        store.seed_resource(resource(
            "p1",
            ResourceKind::Project,
            Ownership::Owned(principal("user_b")),
            None,
        ));
        store.seed_resource(resource(
            "a1",
            ResourceKind::Asset,
            Ownership::Owned(principal("user_a")),
            Some("p1"),
        ));

        let outcome = block_on(store.delete_project_tree(
            ResourceId::from_string("p1".to_string()),
            Ownership::Owned(principal("user_a")),
            principal("user_a"),
            Utc::now(),
        ))
        .unwrap();

        assert_eq!(outcome, CascadeOutcome::OwnerChanged);
        let child = block_on(store.fetch_resource(ResourceId::from_string("a1".to_string())))
            .unwrap()
            .unwrap();
        assert!(child.active);
    }

    #[test]
    fn delete_project_tree_reports_missing_for_inactive_row() {
        let store = MemoryStore::new();
        let mut row = resource(
            "p1",
            ResourceKind::Project,
            Ownership::Owned(principal("user_a")),
            None,
        );
        row.active = false;
        store.seed_resource(row);

        let outcome = block_on(store.delete_project_tree(
            ResourceId::from_string("p1".to_string()),
            Ownership::Owned(principal("user_a")),
            principal("user_a"),
            Utc::now(),
        ))
        .unwrap();

        assert_eq!(outcome, CascadeOutcome::Missing);
    }

    #[test]
    fn accept_invitation_consumes_token_exactly_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let token = InvitationToken::generate();
        store
            .inner
            .write()
            .expect("poisoned lock")
            .invitations
            .insert(
                token.clone(),
                InvitationRecord {
                    org: OrgId::from_string("org_1".to_string()),
                    email: EmailAddress::from_string("b@x.com".to_string()),
                    role: RoleName::from_string("member".to_string()),
                    invited_by: principal("user_a"),
                    token: token.clone(),
                    expires_at: now + chrono::Duration::days(7),
                    accepted_at: None,
                },
            );
        let membership = MembershipRecord {
            org: OrgId::from_string("org_1".to_string()),
            principal: principal("user_b"),
            role: RoleName::from_string("member".to_string()),
            invited_by: Some(principal("user_a")),
            joined_at: now,
            active: true,
        };

        let first =
            block_on(store.accept_invitation(token.clone(), membership.clone(), now)).unwrap();
        let second = block_on(store.accept_invitation(token, membership, now)).unwrap();

        assert!(matches!(first, AcceptOutcome::Accepted(_)));
        assert_eq!(second, AcceptOutcome::AlreadyAccepted);
    }

    #[test]
    fn claim_unclaimed_converts_only_unclaimed_rows() {
        let store = MemoryStore::new();
        store.seed_resource(resource("p1", ResourceKind::Project, Ownership::Unclaimed, None));
        store.seed_resource(resource(
            "p2",
            ResourceKind::Project,
            Ownership::Owned(principal("user_b")),
            None,
        ));

        let claimed =
            block_on(store.claim_unclaimed(principal("user_a"), Utc::now())).unwrap();

        assert_eq!(claimed, 1);
        let row = block_on(store.fetch_resource(ResourceId::from_string("p1".to_string())))
            .unwrap()
            .unwrap();
        assert_eq!(row.owner, Ownership::Owned(principal("user_a")));
        let untouched = block_on(store.fetch_resource(ResourceId::from_string("p2".to_string())))
            .unwrap()
            .unwrap();
        assert_eq!(untouched.owner, Ownership::Owned(principal("user_b")));
    }

    #[test]
    fn insert_org_enforces_slug_uniqueness() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let org = |id: &str| OrganizationRecord {
            id: OrgId::from_string(id.to_string()),
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            settings: json!({}),
            active: true,
            created_at: now,
            updated_at: now,
        };

        assert!(block_on(store.insert_org(org("org_1"))).unwrap());
        assert!(!block_on(store.insert_org(org("org_2"))).unwrap());
    }
}

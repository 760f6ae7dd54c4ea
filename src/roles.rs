//! Role and permission resolution.
//!
//! Resolution is a set union over effective assignments: there is no "deny"
//! permission, only absence of grant, so conflicting grants simply
//! accumulate.

use crate::clock::Clock;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::{Caller, PermissionGrant, RoleAssignment};
use crate::store::Store;
use crate::types::{PermissionName, PrincipalId, RoleName};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

impl<S, K> Engine<S, K>
where
    S: Store,
    K: Clock,
{
    /// True iff an effective assignment links the principal to the named
    /// active role.
    pub async fn has_role(&self, principal: PrincipalId, role: RoleName) -> Result<bool> {
        let Some(record) = self
            .store()
            .fetch_role(role.clone())
            .await
            .map_err(Error::from)?
        else {
            return Ok(false);
        };
        if !record.active {
            return Ok(false);
        }
        let Some(assignment) = self
            .store()
            .assignment(principal, role)
            .await
            .map_err(Error::from)?
        else {
            return Ok(false);
        };
        Ok(assignment.is_effective(self.now()))
    }

    /// True iff some effective assignment's role grants an active permission
    /// of the given name.
    pub async fn has_permission(
        &self,
        principal: PrincipalId,
        permission: PermissionName,
    ) -> Result<bool> {
        let grants = self.effective_permissions(principal).await?;
        Ok(grants.iter().any(|grant| grant.permission == permission))
    }

    /// Union of active permissions across all effective assignments,
    /// deduplicated by permission name and sorted by it. Each grant names
    /// the originating role.
    pub async fn effective_permissions(
        &self,
        principal: PrincipalId,
    ) -> Result<Vec<PermissionGrant>> {
        let now = self.now();
        let assignments = self
            .store()
            .assignments_for(principal)
            .await
            .map_err(Error::from)?;

        let mut resolved: BTreeMap<PermissionName, RoleName> = BTreeMap::new();
        for assignment in assignments {
            if !assignment.is_effective(now) {
                continue;
            }
            let Some(role) = self
                .store()
                .fetch_role(assignment.role.clone())
                .await
                .map_err(Error::from)?
            else {
                continue;
            };
            if !role.active {
                continue;
            }
            let granted = self
                .store()
                .role_grants(role.name.clone())
                .await
                .map_err(Error::from)?;
            for permission in granted {
                if !permission.active {
                    continue;
                }
                resolved
                    .entry(permission.name)
                    .or_insert_with(|| role.name.clone());
            }
        }

        Ok(resolved
            .into_iter()
            .map(|(permission, role)| PermissionGrant { permission, role })
            .collect())
    }

    /// Upserts a role assignment keyed on (principal, role).
    ///
    /// Re-assignment refreshes `assigned_at`/`expires_at` and re-activates
    /// the row instead of duplicating it. Fails `NotFound` when the role is
    /// unknown or inactive.
    pub async fn assign_role(
        &self,
        caller: &Caller,
        principal: PrincipalId,
        role: RoleName,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<RoleAssignment> {
        let actor = caller.require()?;
        let record = self
            .store()
            .fetch_role(role.clone())
            .await
            .map_err(Error::from)?
            .filter(|record| record.active)
            .ok_or_else(|| Error::not_found("role", role.as_str()))?;

        let now = self.now();
        if let Some(expiry) = expires_at
            && expiry <= now
        {
            return Err(Error::Validation(
                "assignment expiry must be in the future".to_string(),
            ));
        }

        let assignment = RoleAssignment {
            principal: principal.clone(),
            role: record.name.clone(),
            assigned_by: actor.id.clone(),
            assigned_at: now,
            expires_at,
            active: true,
        };
        self.store()
            .upsert_assignment(assignment.clone())
            .await
            .map_err(Error::from)?;
        debug!(principal = %principal, role = %record.name, "assigned role");

        self.log_event(
            Some(actor.id.clone()),
            "assign_role",
            "role",
            record.name.to_string(),
            json!({ "principal": principal, "expires_at": expires_at }),
        )
        .await?;
        Ok(assignment)
    }

    /// Marks an assignment inactive, keeping the row for audit history.
    ///
    /// Fails `NotFound` when no assignment row exists; revoking an already
    /// inactive assignment is a no-op success.
    pub async fn revoke_role(
        &self,
        caller: &Caller,
        principal: PrincipalId,
        role: RoleName,
    ) -> Result<()> {
        let actor = caller.require()?;
        let deactivated = self
            .store()
            .deactivate_assignment(principal.clone(), role.clone())
            .await
            .map_err(Error::from)?;
        if !deactivated {
            return Err(Error::not_found("role_assignment", format!("{principal}:{role}")));
        }
        debug!(principal = %principal, role = %role, "revoked role");

        self.log_event(
            Some(actor.id.clone()),
            "remove_role",
            "role",
            role.to_string(),
            json!({ "principal": principal }),
        )
        .await?;
        Ok(())
    }
}

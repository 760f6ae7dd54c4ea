//! Append-only audit log.
//!
//! Entries record privileged actions (grants, revocations, invitations,
//! cascading deletes, the ownership backfill). They are never updated or
//! deleted through the public interface.

use crate::clock::Clock;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::Caller;
use crate::store::Store;
use crate::types::{PermissionName, PrincipalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission required to query the audit log.
pub const VIEW_AUDIT_LOGS: &str = "view_audit_logs";

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// None for system-originated entries.
    pub principal: Option<PrincipalId>,
    /// Stable action identifier, e.g. `assign_role`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Query parameters for audit log listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub principal: Option<PrincipalId>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    /// Maximum rows returned, most recent first.
    pub limit: Option<usize>,
}

impl<S, K> Engine<S, K>
where
    S: Store,
    K: Clock,
{
    /// Appends an audit entry on behalf of the caller.
    ///
    /// An anonymous caller records a system-originated entry (no principal).
    pub async fn record_audit(
        &self,
        caller: &Caller,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Result<AuditEntry> {
        let principal = caller.principal().map(|actor| actor.id.clone());
        self.log_event(
            principal,
            &action.into(),
            &resource_type.into(),
            resource_id.into(),
            details,
        )
        .await
    }

    /// Returns audit entries matching the filter, most recent first.
    ///
    /// Gated by the `view_audit_logs` permission.
    pub async fn query_audit_log(
        &self,
        caller: &Caller,
        filter: AuditFilter,
    ) -> Result<Vec<AuditEntry>> {
        let actor = caller.require()?;
        let permission = PermissionName::from_string(VIEW_AUDIT_LOGS.to_string());
        if !self.has_permission(actor.id.clone(), permission).await? {
            return Err(Error::denied(&actor.id, "audit_log", "query"));
        }
        self.store().query_audit(filter).await.map_err(Error::from)
    }

    pub(crate) async fn log_event(
        &self,
        principal: Option<PrincipalId>,
        action: &str,
        resource_type: &str,
        resource_id: String,
        details: serde_json::Value,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            principal,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            details,
            timestamp: self.now(),
        };
        self.store()
            .append_audit(entry.clone())
            .await
            .map_err(Error::from)?;
        Ok(entry)
    }
}

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::model::{Caller, Principal, ResourceDraft, ResourceKind, ResourceRecord, ResourceUpdate};
use crate::ownership::{AccessMode, Decision, Operation, Ownership, resolve};
use crate::store::Store;
use crate::types::{PermissionName, PrincipalId, ResourceId};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;

/// Permission required to run the ownership backfill migration.
pub const MANAGE_PROJECTS: &str = "manage_projects";

/// Ownership-aware authorization engine with a pluggable store and clock.
#[derive(Debug)]
pub struct Engine<S, K = SystemClock> {
    store: S,
    clock: K,
    access_mode: AccessMode,
    invitation_ttl: Duration,
}

/// Builder for [`Engine`].
pub struct EngineBuilder<S, K = SystemClock> {
    store: S,
    clock: K,
    access_mode: AccessMode,
    invitation_ttl: Duration,
}

impl<S> EngineBuilder<S, SystemClock> {
    /// Creates a new builder with default configuration: legacy-open access
    /// to unclaimed resources and a 7-day invitation TTL.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: SystemClock,
            access_mode: AccessMode::LegacyOpen,
            invitation_ttl: Duration::days(7),
        }
    }
}

impl<S, K> EngineBuilder<S, K> {
    /// Sets the policy for unclaimed legacy resources.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Sets the invitation time-to-live.
    pub fn invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    /// Sets the time source.
    pub fn clock<K2: Clock>(self, clock: K2) -> EngineBuilder<S, K2> {
        EngineBuilder {
            store: self.store,
            clock,
            access_mode: self.access_mode,
            invitation_ttl: self.invitation_ttl,
        }
    }

    /// Builds the engine.
    pub fn build(self) -> Engine<S, K> {
        Engine {
            store: self.store,
            clock: self.clock,
            access_mode: self.access_mode,
            invitation_ttl: self.invitation_ttl,
        }
    }
}

impl<S, K> Engine<S, K>
where
    S: Store,
    K: Clock,
{
    /// The configured policy for unclaimed resources.
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn invitation_ttl(&self) -> Duration {
        self.invitation_ttl
    }

    /// Applies the ownership predicate to a fetched resource snapshot and
    /// turns a denial into an error, before any mutation happens.
    pub(crate) fn authorize(
        &self,
        principal: &Principal,
        record: &ResourceRecord,
        operation: Operation,
    ) -> Result<()> {
        match resolve(self.access_mode, &principal.id, &record.owner, operation) {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(Error::denied(
                &principal.id,
                record.kind.tag(),
                record.id.as_str(),
            )),
        }
    }

    pub(crate) async fn fetch_active_resource(&self, id: &ResourceId) -> Result<ResourceRecord> {
        self.store
            .fetch_resource(id.clone())
            .await
            .map_err(Error::from)?
            .filter(|record| record.active)
            .ok_or_else(|| Error::not_found("resource", id.as_str()))
    }

    /// Creates a resource owned by the caller.
    ///
    /// Assets and layers must name an active project parent; projects must
    /// not name a parent at all.
    pub async fn create_resource(
        &self,
        caller: &Caller,
        draft: ResourceDraft,
    ) -> Result<ResourceRecord> {
        let actor = caller.require()?;
        if draft.name.trim().is_empty() {
            return Err(Error::Validation("resource name must not be empty".to_string()));
        }
        match (&draft.parent, draft.kind.requires_parent()) {
            (None, true) => {
                return Err(Error::Validation(format!(
                    "{} requires a project parent",
                    draft.kind.tag()
                )));
            }
            (Some(_), false) => {
                return Err(Error::Validation("project must not have a parent".to_string()));
            }
            (Some(parent), true) => {
                let parent_record = self.fetch_active_resource(parent).await?;
                if parent_record.kind != ResourceKind::Project {
                    return Err(Error::Validation(format!(
                        "parent {} is not a project",
                        parent
                    )));
                }
            }
            (None, false) => {}
        }

        let now = self.now();
        let record = ResourceRecord {
            id: ResourceId::generate(),
            kind: draft.kind,
            name: draft.name.trim().to_string(),
            owner: Ownership::Owned(actor.id.clone()),
            parent: draft.parent,
            payload: draft.payload,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_resource(record.clone())
            .await
            .map_err(Error::from)?;
        Ok(record)
    }

    /// Reads an active resource, subject to the ownership predicate.
    pub async fn read_resource(&self, caller: &Caller, id: ResourceId) -> Result<ResourceRecord> {
        let actor = caller.require()?;
        let record = self.fetch_active_resource(&id).await?;
        self.authorize(actor, &record, Operation::Read)?;
        Ok(record)
    }

    /// Updates an active resource, subject to the ownership predicate.
    pub async fn update_resource(
        &self,
        caller: &Caller,
        id: ResourceId,
        update: ResourceUpdate,
    ) -> Result<ResourceRecord> {
        let actor = caller.require()?;
        let mut record = self.fetch_active_resource(&id).await?;
        self.authorize(actor, &record, Operation::Update)?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("resource name must not be empty".to_string()));
            }
            record.name = name.trim().to_string();
        }
        if let Some(payload) = update.payload {
            record.payload = payload;
        }
        record.updated_at = self.now();

        let replaced = self
            .store
            .update_resource(record.clone())
            .await
            .map_err(Error::from)?;
        if !replaced {
            return Err(Error::not_found("resource", id.as_str()));
        }
        Ok(record)
    }

    /// One-shot operator migration: assigns `new_owner` to every unclaimed
    /// resource. The default owner is always an explicit argument, never
    /// inferred from registration order.
    pub async fn claim_unclaimed_resources(
        &self,
        caller: &Caller,
        new_owner: PrincipalId,
    ) -> Result<usize> {
        let actor = caller.require()?;
        let permission = PermissionName::from_string(MANAGE_PROJECTS.to_string());
        if !self.has_permission(actor.id.clone(), permission).await? {
            return Err(Error::denied(&actor.id, "resource", "unclaimed"));
        }

        let claimed = self
            .store
            .claim_unclaimed(new_owner.clone(), self.now())
            .await
            .map_err(Error::from)?;
        debug!(operator = %actor.id, owner = %new_owner, claimed, "claimed legacy resources");
        self.log_event(
            Some(actor.id.clone()),
            "claim_unclaimed",
            "resource",
            "unclaimed".to_string(),
            json!({ "new_owner": new_owner, "claimed": claimed }),
        )
        .await?;
        Ok(claimed)
    }
}

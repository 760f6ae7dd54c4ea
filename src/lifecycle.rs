//! Cascading project deletion.
//!
//! Authorization happens on a fetched snapshot before any mutation; the
//! store then re-verifies liveness and ownership inside one atomic step, so
//! children can never be deleted under a parent that turns out to be
//! unauthorized or already gone.

use crate::clock::Clock;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::{Caller, CascadeReport, ResourceKind};
use crate::ownership::Operation;
use crate::store::{CascadeOutcome, Store};
use crate::types::ResourceId;
use serde_json::json;
use tracing::warn;

impl<S, K> Engine<S, K>
where
    S: Store,
    K: Clock,
{
    /// Deletes a project together with its in-scope assets and layers.
    ///
    /// Idempotent at the caller level: a repeat call observes no active
    /// project row and fails `NotFound` without side effects. Children owned
    /// by other principals are left untouched.
    pub async fn delete_project_cascade(
        &self,
        caller: &Caller,
        project: ResourceId,
    ) -> Result<CascadeReport> {
        let actor = caller.require()?;

        let record = self
            .store()
            .fetch_resource(project.clone())
            .await
            .map_err(Error::from)?
            .filter(|record| record.active)
            .ok_or_else(|| Error::not_found("project", project.as_str()))?;
        if record.kind != ResourceKind::Project {
            return Err(Error::Validation(format!("{project} is not a project")));
        }

        self.authorize(actor, &record, Operation::Delete)?;

        let outcome = self
            .store()
            .delete_project_tree(
                project.clone(),
                record.owner.clone(),
                actor.id.clone(),
                self.now(),
            )
            .await
            .map_err(Error::from)?;
        let report = match outcome {
            CascadeOutcome::Missing => {
                return Err(Error::not_found("project", project.as_str()));
            }
            CascadeOutcome::OwnerChanged => {
                return Err(Error::denied(&actor.id, "project", project.as_str()));
            }
            CascadeOutcome::Deleted(report) => report,
        };
        if !report.soft_deleted {
            warn!(project = %project, "soft delete rejected, project row hard-deleted");
        }

        self.log_event(
            Some(actor.id.clone()),
            "delete_project_cascade",
            "project",
            project.to_string(),
            json!({
                "soft_deleted": report.soft_deleted,
                "assets_deleted": report.assets_deleted,
                "layers_deleted": report.layers_deleted,
            }),
        )
        .await?;
        Ok(report)
    }
}

//! Ownership-aware authorization and resource-lifecycle library.
//!
//! This crate decides who may read, mutate, or delete an owned resource,
//! resolves role and permission grants, manages organization memberships
//! with single-use invitations, and performs cascading project deletion with
//! a hard-delete fallback. The default behavior is deny-by-default; the one
//! deliberate exception is the legacy-open policy for unclaimed resources.
//! Use [`Engine`] for every operation and the store traits to plug in a
//! backend.
//!
//! # Examples
//!
//! Basic ownership flow using the in-memory store:
//! ```no_run
//! use rs_warden::{Caller, EngineBuilder, MemoryStore, Principal};
//! use rs_warden::{EmailAddress, PrincipalId, ResourceDraft, ResourceKind};
//!
//! let engine = EngineBuilder::new(MemoryStore::new()).build();
//! let caller = Caller::authenticated(Principal::new(
//!     PrincipalId::new("user_1").unwrap(),
//!     EmailAddress::new("user_1@example.com").unwrap(),
//! ));
//! let draft = ResourceDraft {
//!     kind: ResourceKind::Project,
//!     name: "Field survey".to_string(),
//!     parent: None,
//!     payload: serde_json::json!({}),
//! };
//! let _ = engine.create_resource(&caller, draft);
//! ```
//!
//! Strict mode closes the legacy-open window for unclaimed rows:
//! ```no_run
//! use rs_warden::{AccessMode, EngineBuilder, MemoryStore};
//!
//! let engine = EngineBuilder::new(MemoryStore::new())
//!     .access_mode(AccessMode::Strict)
//!     .build();
//! # let _ = engine;
//! ```
#![forbid(unsafe_code)]

mod audit;
mod clock;
mod engine;
mod error;
mod lifecycle;
mod memory_store;
mod model;
mod org;
mod ownership;
mod roles;
mod store;
mod types;

pub use crate::audit::{AuditEntry, AuditFilter, VIEW_AUDIT_LOGS};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::engine::{Engine, EngineBuilder, MANAGE_PROJECTS};
pub use crate::error::{EntityRef, Error, Result, StoreError};
pub use crate::memory_store::MemoryStore;
pub use crate::model::{
    Caller, CascadeReport, InvitationRecord, MembershipRecord, OrganizationRecord,
    PermissionGrant, PermissionRecord, Principal, ResourceDraft, ResourceKind, ResourceRecord,
    ResourceUpdate, RoleAssignment, RoleRecord,
};
pub use crate::org::ORG_OWNER_ROLE;
pub use crate::ownership::{AccessMode, Decision, Operation, Ownership, resolve};
pub use crate::store::{
    AcceptOutcome, AuditStore, CascadeOutcome, OrganizationStore, ResourceStore, RoleStore, Store,
};
pub use crate::types::{
    EmailAddress, InvitationToken, OrgId, PermissionName, PrincipalId, ResourceId, RoleName,
};

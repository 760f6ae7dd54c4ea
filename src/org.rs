//! Organizations, memberships, and time-bounded invitations.
//!
//! Membership roles are independent from per-resource ownership; they scope
//! organization-level visibility and never widen the single-owner resource
//! predicate.

use crate::clock::Clock;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::{Caller, InvitationRecord, MembershipRecord, OrganizationRecord};
use crate::store::{AcceptOutcome, Store};
use crate::types::{EmailAddress, InvitationToken, OrgId, PrincipalId, RoleName};
use serde_json::json;
use tracing::debug;

/// Membership role given to the organization creator.
pub const ORG_OWNER_ROLE: &str = "owner";

fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::Validation("slug must not be empty".to_string()));
    }
    let valid = slug
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !valid {
        return Err(Error::Validation(
            "slug must be lowercase alphanumeric with dashes".to_string(),
        ));
    }
    Ok(())
}

impl<S, K> Engine<S, K>
where
    S: Store,
    K: Clock,
{
    /// Creates an organization with a unique slug. The creator joins as
    /// `owner`.
    pub async fn create_organization(
        &self,
        caller: &Caller,
        name: impl Into<String>,
        slug: impl Into<String>,
        settings: serde_json::Value,
    ) -> Result<OrganizationRecord> {
        let actor = caller.require()?;
        let name = name.into();
        let slug = slug.into();
        if name.trim().is_empty() {
            return Err(Error::Validation(
                "organization name must not be empty".to_string(),
            ));
        }
        validate_slug(&slug)?;

        let now = self.now();
        let record = OrganizationRecord {
            id: OrgId::generate(),
            name: name.trim().to_string(),
            slug: slug.clone(),
            settings,
            active: true,
            created_at: now,
            updated_at: now,
        };
        let inserted = self
            .store()
            .insert_org(record.clone())
            .await
            .map_err(Error::from)?;
        if !inserted {
            return Err(Error::conflict("organization", slug, "slug already in use"));
        }

        self.store()
            .upsert_membership(MembershipRecord {
                org: record.id.clone(),
                principal: actor.id.clone(),
                role: RoleName::from_string(ORG_OWNER_ROLE.to_string()),
                invited_by: None,
                joined_at: now,
                active: true,
            })
            .await
            .map_err(Error::from)?;
        Ok(record)
    }

    /// Invites an email address into an organization with an intended role.
    ///
    /// The inviter must be an active member. Fails `Conflict` while an open
    /// (unaccepted, unexpired) invitation exists for the same address.
    pub async fn invite(
        &self,
        caller: &Caller,
        org: OrgId,
        email: EmailAddress,
        role: RoleName,
    ) -> Result<InvitationRecord> {
        let actor = caller.require()?;
        self.fetch_active_org(&org).await?;

        let member = self
            .store()
            .membership(org.clone(), actor.id.clone())
            .await
            .map_err(Error::from)?;
        if !member.is_some_and(|membership| membership.active) {
            return Err(Error::denied(&actor.id, "organization", org.as_str()));
        }

        let now = self.now();
        let open = self
            .store()
            .open_invitation(org.clone(), email.clone(), now)
            .await
            .map_err(Error::from)?;
        if open.is_some() {
            return Err(Error::conflict(
                "invitation",
                email.as_str(),
                "an open invitation already exists",
            ));
        }

        let invitation = InvitationRecord {
            org: org.clone(),
            email: email.clone(),
            role: role.clone(),
            invited_by: actor.id.clone(),
            token: InvitationToken::generate(),
            expires_at: now + self.invitation_ttl(),
            accepted_at: None,
        };
        self.store()
            .insert_invitation(invitation.clone())
            .await
            .map_err(Error::from)?;
        debug!(org = %org, email = %email, role = %role, "invited member");

        self.log_event(
            Some(actor.id.clone()),
            "invite_member",
            "organization",
            org.to_string(),
            json!({ "email": email, "role": role }),
        )
        .await?;
        Ok(invitation)
    }

    /// Consumes an invitation token and upserts the membership.
    ///
    /// Valid only when the token is unaccepted, unexpired, and addressed to
    /// the caller's email. The store consumes the token and writes the
    /// membership in one atomic step, so a replay can never produce a second
    /// membership row.
    pub async fn accept_invitation(
        &self,
        caller: &Caller,
        token: InvitationToken,
    ) -> Result<MembershipRecord> {
        let actor = caller.require()?;
        let invitation = self
            .store()
            .fetch_invitation(token.clone())
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("invitation", token.as_str()))?;

        let now = self.now();
        if invitation.is_accepted() {
            return Err(Error::conflict(
                "invitation",
                token.as_str(),
                "token already consumed",
            ));
        }
        if invitation.is_expired(now) {
            return Err(Error::expired("invitation", token.as_str()));
        }
        if actor.email != invitation.email {
            return Err(Error::denied(&actor.id, "invitation", token.as_str()));
        }

        let membership = MembershipRecord {
            org: invitation.org.clone(),
            principal: actor.id.clone(),
            role: invitation.role.clone(),
            invited_by: Some(invitation.invited_by.clone()),
            joined_at: now,
            active: true,
        };
        let outcome = self
            .store()
            .accept_invitation(token.clone(), membership, now)
            .await
            .map_err(Error::from)?;
        let membership = match outcome {
            AcceptOutcome::Accepted(membership) => membership,
            AcceptOutcome::AlreadyAccepted => {
                return Err(Error::conflict(
                    "invitation",
                    token.as_str(),
                    "token already consumed",
                ));
            }
            AcceptOutcome::Expired => return Err(Error::expired("invitation", token.as_str())),
            AcceptOutcome::Missing => return Err(Error::not_found("invitation", token.as_str())),
        };
        debug!(org = %membership.org, principal = %actor.id, "accepted invitation");

        self.log_event(
            Some(actor.id.clone()),
            "accept_invitation",
            "organization",
            membership.org.to_string(),
            json!({ "role": membership.role }),
        )
        .await?;
        Ok(membership)
    }

    /// Returns the active membership role of a principal within an
    /// organization, if any.
    pub async fn membership_role(
        &self,
        org: OrgId,
        principal: PrincipalId,
    ) -> Result<Option<RoleName>> {
        let membership = self
            .store()
            .membership(org, principal)
            .await
            .map_err(Error::from)?;
        Ok(membership
            .filter(|record| record.active)
            .map(|record| record.role))
    }

    async fn fetch_active_org(&self, org: &OrgId) -> Result<OrganizationRecord> {
        self.store()
            .fetch_org(org.clone())
            .await
            .map_err(Error::from)?
            .filter(|record| record.active)
            .ok_or_else(|| Error::not_found("organization", org.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::EngineBuilder;
    use crate::memory_store::MemoryStore;
    use crate::model::Principal;
    use crate::store::OrganizationStore;
    use chrono::{Duration, Utc};
    use futures::executor::block_on;

    fn caller(id: &str, email: &str) -> Caller {
        Caller::authenticated(Principal::new(
            PrincipalId::from_string(id.to_string()),
            EmailAddress::new(email).unwrap(),
        ))
    }

    fn member_role() -> RoleName {
        RoleName::from_string("member".to_string())
    }

    #[test]
    fn creator_becomes_owner_member() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");

        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();

        let role = block_on(engine.membership_role(
            org.id,
            PrincipalId::from_string("user_a".to_string()),
        ))
        .unwrap();
        assert_eq!(role, Some(RoleName::from_string("owner".to_string())));
    }

    #[test]
    fn duplicate_slug_conflicts() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");

        block_on(engine.create_organization(&creator, "Acme", "acme", json!({}))).unwrap();
        let result = block_on(engine.create_organization(&creator, "Acme 2", "acme", json!({})));

        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[test]
    fn invalid_slug_is_rejected() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();

        let result = block_on(engine.create_organization(
            &caller("user_a", "a@x.com"),
            "Acme",
            "Not A Slug",
            json!({}),
        ));

        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn non_member_cannot_invite() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();

        let result = block_on(engine.invite(
            &caller("user_c", "c@x.com"),
            org.id,
            EmailAddress::new("b@x.com").unwrap(),
            member_role(),
        ));

        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
    }

    #[test]
    fn duplicate_open_invitation_conflicts() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();
        let email = EmailAddress::new("b@x.com").unwrap();

        block_on(engine.invite(&creator, org.id.clone(), email.clone(), member_role())).unwrap();
        let result = block_on(engine.invite(&creator, org.id, email, member_role()));

        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[test]
    fn expired_invitation_can_be_reissued() {
        let clock = ManualClock::new(Utc::now());
        let engine = EngineBuilder::new(MemoryStore::new())
            .clock(clock.clone())
            .build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();
        let email = EmailAddress::new("b@x.com").unwrap();

        block_on(engine.invite(&creator, org.id.clone(), email.clone(), member_role())).unwrap();
        clock.advance(Duration::days(8));

        assert!(block_on(engine.invite(&creator, org.id, email, member_role())).is_ok());
    }

    #[test]
    fn accept_flow_creates_membership() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();

        let invitation = block_on(engine.invite(
            &creator,
            org.id.clone(),
            EmailAddress::new("b@x.com").unwrap(),
            member_role(),
        ))
        .unwrap();

        let invitee = caller("user_b", "b@x.com");
        let membership =
            block_on(engine.accept_invitation(&invitee, invitation.token)).unwrap();

        assert_eq!(membership.role, member_role());
        assert_eq!(
            membership.invited_by,
            Some(PrincipalId::from_string("user_a".to_string()))
        );
        let role = block_on(engine.membership_role(
            org.id,
            PrincipalId::from_string("user_b".to_string()),
        ))
        .unwrap();
        assert_eq!(role, Some(member_role()));
    }

    #[test]
    fn accept_with_wrong_email_is_denied() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();
        let invitation = block_on(engine.invite(
            &creator,
            org.id,
            EmailAddress::new("b@x.com").unwrap(),
            member_role(),
        ))
        .unwrap();

        let stranger = caller("user_c", "c@x.com");
        let result = block_on(engine.accept_invitation(&stranger, invitation.token));

        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
    }

    #[test]
    fn accept_expired_token_fails_and_leaves_no_membership() {
        let clock = ManualClock::new(Utc::now());
        let engine = EngineBuilder::new(MemoryStore::new())
            .clock(clock.clone())
            .build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();
        let invitation = block_on(engine.invite(
            &creator,
            org.id.clone(),
            EmailAddress::new("b@x.com").unwrap(),
            member_role(),
        ))
        .unwrap();

        clock.advance(Duration::days(8));
        let invitee = caller("user_b", "b@x.com");
        let result = block_on(engine.accept_invitation(&invitee, invitation.token));

        assert!(matches!(result, Err(Error::Expired { .. })));
        let role = block_on(engine.membership_role(
            org.id,
            PrincipalId::from_string("user_b".to_string()),
        ))
        .unwrap();
        assert_eq!(role, None);
    }

    #[test]
    fn second_acceptance_conflicts_and_keeps_one_membership() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();
        let creator = caller("user_a", "a@x.com");
        let org = block_on(engine.create_organization(&creator, "Acme", "acme", json!({})))
            .unwrap();
        let invitation = block_on(engine.invite(
            &creator,
            org.id.clone(),
            EmailAddress::new("b@x.com").unwrap(),
            member_role(),
        ))
        .unwrap();

        let invitee = caller("user_b", "b@x.com");
        block_on(engine.accept_invitation(&invitee, invitation.token.clone())).unwrap();
        let result = block_on(engine.accept_invitation(&invitee, invitation.token));

        assert!(matches!(result, Err(Error::Conflict { .. })));
        let membership = block_on(engine.store().membership(
            org.id,
            PrincipalId::from_string("user_b".to_string()),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(membership.role, member_role());
    }

    #[test]
    fn unknown_token_fails_not_found() {
        let engine = EngineBuilder::new(MemoryStore::new()).build();

        let result = block_on(engine.accept_invitation(
            &caller("user_b", "b@x.com"),
            InvitationToken::generate(),
        ));

        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}

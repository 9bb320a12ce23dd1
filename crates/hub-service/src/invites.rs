use chrono::{DateTime, Utc};
use hub_db::models::RedeemOutcome;
use hub_types::models::{Invite, Member, Permission};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;

use crate::{Author, MessageService, ServiceError, ServiceResult};

const CODE_LEN: usize = 8;

fn generate_code() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(CODE_LEN)
        .map(char::from)
        .collect()
}

impl MessageService {
    pub fn create_invite(
        &self,
        community_id: &str,
        actor: &Author,
        max_uses: Option<i64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> ServiceResult<Invite> {
        self.get_community(community_id)?;
        self.require_permission(community_id, &actor.user_id, Permission::CreateInvites)?;
        if max_uses.is_some_and(|n| n < 1) {
            return Err(ServiceError::invalid("maxUses must be at least 1"));
        }
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ServiceError::invalid("invite expiry must be in the future"));
        }

        let invite = self.db().create_invite(
            community_id,
            &generate_code(),
            &actor.user_id,
            max_uses,
            expires_at.as_ref(),
        )?;
        info!(community_id, invite_id = %invite.id, "Invite created");
        Ok(invite)
    }

    pub fn list_invites(&self, community_id: &str, actor: &Author) -> ServiceResult<Vec<Invite>> {
        self.require_permission(community_id, &actor.user_id, Permission::CreateInvites)?;
        Ok(self.db().list_invites(community_id)?)
    }

    /// Joins the community behind a code. Existing members are let through
    /// without using the invite up.
    pub fn redeem_invite(&self, code: &str, user: &Author) -> ServiceResult<Member> {
        match self
            .db()
            .redeem_invite(code.trim(), &user.user_id, &user.username, &Utc::now())?
        {
            RedeemOutcome::Redeemed {
                community_id,
                joined,
            } => {
                if joined {
                    info!(%community_id, user_id = %user.user_id, "Member joined by invite");
                }
                self.db()
                    .get_member(&community_id, &user.user_id)?
                    .ok_or_else(|| ServiceError::missing("member"))
            }
            RedeemOutcome::Unknown => Err(ServiceError::missing("invite")),
            RedeemOutcome::Expired => Err(ServiceError::invalid("invite has expired")),
            RedeemOutcome::Exhausted => Err(ServiceError::invalid("invite has no uses left")),
        }
    }

    pub fn revoke_invite(&self, invite_id: &str, actor: &Author) -> ServiceResult<()> {
        let invite = self
            .db()
            .get_invite(invite_id)?
            .ok_or_else(|| ServiceError::missing("invite"))?;
        self.require_permission(&invite.community_id, &actor.user_id, Permission::CreateInvites)?;
        self.db().delete_invite(invite_id)?;
        info!(invite_id, "Invite revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn codes_are_eight_alphanumerics() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn invite_opens_a_private_community() {
        let svc = service();
        let c = svc.create_community(&alice(), "secret", None, false).unwrap();
        let invite = svc.create_invite(&c.id, &alice(), Some(1), None).unwrap();

        let member = svc.redeem_invite(&invite.code, &bob()).unwrap();
        assert_eq!(member.community_id, c.id);
        assert_eq!(member.role, "member");

        // bob again does not consume a use, carol finds it exhausted
        svc.redeem_invite(&invite.code, &bob()).unwrap();
        let err = svc.redeem_invite(&invite.code, &carol()).unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn revoked_codes_stop_working() {
        let svc = service();
        let (c, _) = community(&svc);
        let invite = svc.create_invite(&c.id, &alice(), None, None).unwrap();
        assert_eq!(
            svc.revoke_invite(&invite.id, &bob()).unwrap_err().kind().as_str(),
            "unauthorized"
        );
        svc.revoke_invite(&invite.id, &alice()).unwrap();
        let err = svc.redeem_invite(&invite.code, &carol()).unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
    }
}

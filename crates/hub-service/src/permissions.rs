use hub_types::models::{Channel, MEMBER_ROLE, OWNER_ROLE, Permission, Role};
use tracing::info;

use crate::{Author, MessageService, ServiceError, ServiceResult, required_text};

impl MessageService {
    /// Effective permissions of a user in a community. Owners hold every
    /// permission regardless of stored roles; non-members hold none.
    pub fn get_member_permissions(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> ServiceResult<Vec<Permission>> {
        let Some(member) = self.db().get_member(community_id, user_id)? else {
            return Ok(Vec::new());
        };
        if member.role == OWNER_ROLE {
            return Ok(Permission::ALL.to_vec());
        }
        if let Some(role) = self.db().get_role_by_name(community_id, &member.role)? {
            return Ok(role.permissions);
        }
        if member.role == MEMBER_ROLE {
            return Ok(Permission::MEMBER_DEFAULTS.to_vec());
        }
        Ok(Vec::new())
    }

    pub fn has_permission(
        &self,
        community_id: &str,
        user_id: &str,
        permission: Permission,
    ) -> ServiceResult<bool> {
        Ok(self
            .get_member_permissions(community_id, user_id)?
            .contains(&permission))
    }

    pub(crate) fn require_permission(
        &self,
        community_id: &str,
        user_id: &str,
        permission: Permission,
    ) -> ServiceResult<()> {
        if self.has_permission(community_id, user_id, permission)? {
            Ok(())
        } else {
            Err(ServiceError::denied(format!("missing permission {permission}")))
        }
    }

    pub(crate) fn channel(&self, channel_id: &str) -> ServiceResult<Channel> {
        self.db()
            .get_channel(channel_id)?
            .ok_or_else(|| ServiceError::missing("channel"))
    }

    pub fn create_role(
        &self,
        community_id: &str,
        actor: &Author,
        name: &str,
        permissions: &[Permission],
        color: Option<&str>,
    ) -> ServiceResult<Role> {
        self.require_permission(community_id, &actor.user_id, Permission::ManageRoles)?;
        let name = required_text("role name", name, 32)?;
        if name.eq_ignore_ascii_case(OWNER_ROLE) {
            return Err(ServiceError::invalid("the owner role is reserved"));
        }
        if self.db().get_role_by_name(community_id, &name)?.is_some() {
            return Err(ServiceError::invalid(format!("role {name} already exists")));
        }

        let mut perms = permissions.to_vec();
        perms.sort_by_key(|p| p.as_str());
        perms.dedup();

        let role = self.db().create_role(community_id, &name, color, &perms)?;
        info!(community_id, role = %role.name, "Role created");
        Ok(role)
    }

    pub fn list_roles(&self, community_id: &str) -> ServiceResult<Vec<Role>> {
        Ok(self.db().list_roles(community_id)?)
    }

    /// Gives a member a stored role or `member`. The owner's role never changes.
    pub fn assign_role(
        &self,
        community_id: &str,
        actor: &Author,
        target_user_id: &str,
        role: &str,
    ) -> ServiceResult<()> {
        self.require_permission(community_id, &actor.user_id, Permission::ManageRoles)?;
        if role == OWNER_ROLE {
            return Err(ServiceError::invalid("the owner role cannot be assigned"));
        }
        if role != MEMBER_ROLE && self.db().get_role_by_name(community_id, role)?.is_none() {
            return Err(ServiceError::missing("role"));
        }

        let target = self
            .db()
            .get_member(community_id, target_user_id)?
            .ok_or_else(|| ServiceError::missing("member"))?;
        if target.role == OWNER_ROLE {
            return Err(ServiceError::denied("the owner's role cannot be changed"));
        }

        self.db().set_member_role(community_id, target_user_id, role)?;
        info!(community_id, user_id = target_user_id, role, "Role assigned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use hub_types::models::Permission;

    #[test]
    fn owner_holds_every_permission_whatever_the_roles_say() {
        let svc = service();
        let (c, _) = community(&svc);
        // a stored role that happens to be called "member" must not affect the owner
        svc.create_role(&c.id, &alice(), "member", &[], None).unwrap();

        for p in Permission::ALL {
            assert!(svc.has_permission(&c.id, "u1", p).unwrap(), "{p}");
        }
        // ...but it does override the defaults for plain members
        assert!(!svc.has_permission(&c.id, "u2", Permission::SendMessages).unwrap());
    }

    #[test]
    fn members_get_defaults_and_outsiders_nothing() {
        let svc = service();
        let (c, _) = community(&svc);
        assert_eq!(
            svc.get_member_permissions(&c.id, "u2").unwrap(),
            Permission::MEMBER_DEFAULTS
        );
        assert!(!svc.has_permission(&c.id, "u2", Permission::PinMessages).unwrap());
        assert!(svc.get_member_permissions(&c.id, "stranger").unwrap().is_empty());
    }

    #[test]
    fn assigned_role_grants_its_permissions() {
        let svc = service();
        let (c, _) = community(&svc);
        svc.create_role(&c.id, &alice(), "moderator", &[Permission::PinMessages], None)
            .unwrap();
        svc.assign_role(&c.id, &alice(), "u2", "moderator").unwrap();
        assert!(svc.has_permission(&c.id, "u2", Permission::PinMessages).unwrap());
        assert!(!svc.has_permission(&c.id, "u2", Permission::SendMessages).unwrap());
    }

    #[test]
    fn owner_cannot_be_demoted_or_granted() {
        let svc = service();
        let (c, _) = community(&svc);
        svc.create_role(&c.id, &alice(), "admin", &[Permission::ManageRoles], None)
            .unwrap();
        svc.assign_role(&c.id, &alice(), "u2", "admin").unwrap();

        let err = svc.assign_role(&c.id, &bob(), "u1", "member").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        let err = svc.assign_role(&c.id, &bob(), "u3", "owner").unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
        assert!(svc.create_role(&c.id, &alice(), "Owner", &[], None).is_err());
    }

    #[test]
    fn plain_members_cannot_manage_roles() {
        let svc = service();
        let (c, _) = community(&svc);
        let err = svc.create_role(&c.id, &bob(), "vip", &[], None).unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
    }
}

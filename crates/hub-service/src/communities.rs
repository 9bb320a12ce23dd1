use hub_types::models::{Channel, ChannelKind, Community, Member, OWNER_ROLE, Permission};
use tracing::info;

use crate::{Author, MessageService, ServiceError, ServiceResult, required_text};

impl MessageService {
    pub fn create_community(
        &self,
        owner: &Author,
        name: &str,
        description: Option<&str>,
        is_public: bool,
    ) -> ServiceResult<Community> {
        let name = required_text("community name", name, 100)?;
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let community = self.db().create_community(
            &owner.user_id,
            &owner.username,
            &name,
            description,
            is_public,
        )?;
        info!(community_id = %community.id, owner = %owner.user_id, "Community created");
        Ok(community)
    }

    pub fn get_community(&self, community_id: &str) -> ServiceResult<Community> {
        self.db()
            .get_community(community_id)?
            .ok_or_else(|| ServiceError::missing("community"))
    }

    pub fn list_public_communities(&self) -> ServiceResult<Vec<Community>> {
        Ok(self.db().list_public_communities()?)
    }

    pub fn list_user_communities(&self, user_id: &str) -> ServiceResult<Vec<Community>> {
        Ok(self.db().list_user_communities(user_id)?)
    }

    /// Joining twice returns the existing membership unchanged. Private
    /// communities are only reachable through an invite.
    pub fn join_community(&self, community_id: &str, user: &Author) -> ServiceResult<Member> {
        let community = self.get_community(community_id)?;
        if let Some(existing) = self.db().get_member(community_id, &user.user_id)? {
            return Ok(existing);
        }
        if !community.is_public {
            return Err(ServiceError::denied("community is invite-only"));
        }
        if self
            .db()
            .add_member(community_id, &user.user_id, &user.username)?
        {
            info!(community_id, user_id = %user.user_id, "Member joined");
        }
        self.db()
            .get_member(community_id, &user.user_id)?
            .ok_or_else(|| ServiceError::missing("member"))
    }

    pub fn leave_community(&self, community_id: &str, user_id: &str) -> ServiceResult<()> {
        let member = self
            .db()
            .get_member(community_id, user_id)?
            .ok_or_else(|| ServiceError::missing("member"))?;
        if member.role == OWNER_ROLE {
            return Err(ServiceError::invalid("the owner cannot leave their community"));
        }
        self.db().remove_member(community_id, user_id)?;
        info!(community_id, user_id, "Member left");
        Ok(())
    }

    pub fn list_channels(&self, community_id: &str) -> ServiceResult<Vec<Channel>> {
        self.get_community(community_id)?;
        Ok(self.db().list_channels(community_id)?)
    }

    pub fn create_channel(
        &self,
        community_id: &str,
        actor: &Author,
        name: &str,
        kind: ChannelKind,
    ) -> ServiceResult<Channel> {
        self.get_community(community_id)?;
        self.require_permission(community_id, &actor.user_id, Permission::ManageChannels)?;
        let name = required_text("channel name", name, 64)?;
        let channel = self.db().create_channel(community_id, &name, kind)?;
        info!(community_id, channel_id = %channel.id, "Channel created");
        Ok(channel)
    }

    pub fn list_members(&self, community_id: &str) -> ServiceResult<Vec<Member>> {
        self.get_community(community_id)?;
        Ok(self.db().list_members(community_id)?)
    }

    /// Returns `false` when the user is not a member; nothing is recorded then.
    pub fn set_member_online(
        &self,
        community_id: &str,
        user_id: &str,
        online: bool,
    ) -> ServiceResult<bool> {
        Ok(self.db().set_member_online(community_id, user_id, online)?)
    }
}

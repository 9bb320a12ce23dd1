use hub_types::models::{DirectMessage, DmConversation};
use tracing::debug;

use crate::{MAX_CONTENT_CHARS, MAX_PAGE, MessageService, ServiceError, ServiceResult, required_text};

impl MessageService {
    /// The one conversation between two users, in either argument order.
    pub fn get_or_create_dm_conversation(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> ServiceResult<DmConversation> {
        let other = other_user_id.trim();
        if user_id.is_empty() || other.is_empty() {
            return Err(ServiceError::invalid("both participants are required"));
        }
        if user_id == other {
            return Err(ServiceError::invalid("cannot open a conversation with yourself"));
        }
        Ok(self.db().get_or_create_conversation(user_id, other)?)
    }

    pub fn send_direct_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> ServiceResult<DirectMessage> {
        let conversation = self.participant_conversation(conversation_id, sender_id)?;
        let content = required_text("content", content, MAX_CONTENT_CHARS)?;
        let dm = self
            .db()
            .insert_direct_message(&conversation.id, sender_id, &content)?;
        debug!(conversation_id, dm_id = %dm.id, "Direct message stored");
        Ok(dm)
    }

    pub fn list_dm_conversations(&self, user_id: &str) -> ServiceResult<Vec<DmConversation>> {
        Ok(self.db().list_conversations(user_id)?)
    }

    /// Oldest first. Only the two participants may read.
    pub fn list_direct_messages(
        &self,
        conversation_id: &str,
        actor_id: &str,
        limit: u32,
    ) -> ServiceResult<Vec<DirectMessage>> {
        self.participant_conversation(conversation_id, actor_id)?;
        Ok(self
            .db()
            .list_direct_messages(conversation_id, limit.clamp(1, MAX_PAGE))?)
    }

    fn participant_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> ServiceResult<DmConversation> {
        let conversation = self
            .db()
            .get_conversation(conversation_id)?
            .ok_or_else(|| ServiceError::missing("conversation"))?;
        if !conversation.has_participant(user_id) {
            return Err(ServiceError::denied("not a participant of this conversation"));
        }
        Ok(conversation)
    }
}

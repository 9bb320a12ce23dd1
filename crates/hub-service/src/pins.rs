use hub_types::models::{Message, Permission, PinnedMessage};
use tracing::info;

use crate::{Author, MessageService, ServiceResult};

impl MessageService {
    /// Pinning an already pinned message is a no-op. Returns the pinned message.
    pub fn pin_message(&self, message_id: &str, actor: &Author) -> ServiceResult<Message> {
        let message = self.get_message(message_id)?;
        let channel = self.channel(&message.channel_id)?;
        self.require_permission(&channel.community_id, &actor.user_id, Permission::PinMessages)?;

        if self
            .db()
            .pin_message(message_id, &channel.id, &actor.user_id)?
        {
            info!(message_id, channel_id = %channel.id, "Message pinned");
        }
        Ok(message)
    }

    /// Unpinning a message that is not pinned is a no-op.
    pub fn unpin_message(&self, message_id: &str, actor: &Author) -> ServiceResult<Message> {
        let message = self.get_message(message_id)?;
        let channel = self.channel(&message.channel_id)?;
        self.require_permission(&channel.community_id, &actor.user_id, Permission::PinMessages)?;

        if self.db().unpin_message(message_id)? {
            info!(message_id, channel_id = %channel.id, "Message unpinned");
        }
        Ok(message)
    }

    pub fn list_pinned_messages(&self, channel_id: &str) -> ServiceResult<Vec<PinnedMessage>> {
        self.channel(channel_id)?;
        Ok(self.db().list_pinned_messages(channel_id)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;

    #[test]
    fn pin_twice_keeps_one_entry() {
        let svc = service();
        let (_, ch) = community(&svc);
        let m = svc.send_message(&ch, &bob(), "rules", None, None).unwrap().message;
        svc.pin_message(&m.id, &alice()).unwrap();
        svc.pin_message(&m.id, &alice()).unwrap();
        assert_eq!(svc.list_pinned_messages(&ch).unwrap().len(), 1);

        svc.unpin_message(&m.id, &alice()).unwrap();
        svc.unpin_message(&m.id, &alice()).unwrap();
        assert!(svc.list_pinned_messages(&ch).unwrap().is_empty());
    }

    #[test]
    fn members_without_pin_permission_are_refused() {
        let svc = service();
        let (_, ch) = community(&svc);
        let m = svc.send_message(&ch, &bob(), "mine", None, None).unwrap().message;
        let err = svc.pin_message(&m.id, &bob()).unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
    }
}

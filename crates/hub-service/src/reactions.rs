use hub_types::models::ReactionSummary;
use tracing::debug;

use crate::{Author, MessageService, ServiceError, ServiceResult};

const MAX_EMOJI_BYTES: usize = 64;

impl MessageService {
    /// Adding an existing reaction changes nothing. Always returns the full
    /// summary for the message.
    pub fn add_reaction(
        &self,
        message_id: &str,
        actor: &Author,
        emoji: &str,
    ) -> ServiceResult<Vec<ReactionSummary>> {
        let emoji = check_emoji(emoji)?;
        self.get_message(message_id)?;
        let added = self
            .db()
            .add_reaction(message_id, &actor.user_id, &actor.username, emoji)?;
        debug!(message_id, emoji, added, "Reaction add");
        Ok(self.db().reaction_summary(message_id)?)
    }

    /// Removing a reaction that is not there, even on a message that is gone,
    /// is a no-op.
    pub fn remove_reaction(
        &self,
        message_id: &str,
        actor_id: &str,
        emoji: &str,
    ) -> ServiceResult<Vec<ReactionSummary>> {
        let emoji = check_emoji(emoji)?;
        let removed = self.db().remove_reaction(message_id, actor_id, emoji)?;
        debug!(message_id, emoji, removed, "Reaction remove");
        Ok(self.db().reaction_summary(message_id)?)
    }
}

fn check_emoji(emoji: &str) -> ServiceResult<&str> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(ServiceError::invalid("emoji is required"));
    }
    if emoji.len() > MAX_EMOJI_BYTES {
        return Err(ServiceError::invalid("emoji is too long"));
    }
    Ok(emoji)
}

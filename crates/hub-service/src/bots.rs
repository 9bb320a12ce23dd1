use hub_db::models::NewMessage;
use hub_types::models::{Bot, MessageView, Permission};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{Author, MessageService, ServiceError, ServiceResult, required_text};

const KEY_PREFIX: &str = "hub_bot_";

/// Hex SHA-256 of an API key, which is all the store ever sees.
pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

impl MessageService {
    /// Returns the bot and its plaintext key. The key cannot be recovered later.
    pub fn create_bot(
        &self,
        community_id: &str,
        actor: &Author,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<(Bot, String)> {
        self.get_community(community_id)?;
        self.require_permission(community_id, &actor.user_id, Permission::ManageBots)?;
        let name = required_text("bot name", name, 32)?;
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let key = generate_api_key();
        let bot = self
            .db()
            .create_bot(community_id, &name, description, &hash_api_key(&key))?;
        info!(community_id, bot_id = %bot.id, "Bot created");
        Ok((bot, key))
    }

    pub fn list_bots(&self, community_id: &str) -> ServiceResult<Vec<Bot>> {
        Ok(self.db().list_bots(community_id)?)
    }

    pub fn set_bot_active(&self, bot_id: &str, actor: &Author, active: bool) -> ServiceResult<Bot> {
        let bot = self
            .db()
            .get_bot(bot_id)?
            .ok_or_else(|| ServiceError::missing("bot"))?;
        self.require_permission(&bot.community_id, &actor.user_id, Permission::ManageBots)?;
        self.db().set_bot_active(bot_id, active)?;
        info!(bot_id, active, "Bot activation changed");
        Ok(Bot {
            is_active: active,
            ..bot
        })
    }

    /// Posts as a bot authenticated by API key. Unknown keys, inactive bots and
    /// channels outside the bot's community are all refused the same way.
    pub fn send_bot_message(
        &self,
        api_key: &str,
        channel_id: &str,
        content: &str,
    ) -> ServiceResult<MessageView> {
        let Some(bot) = self.db().get_bot_by_key_hash(&hash_api_key(api_key))? else {
            warn!("Bot message with unknown API key");
            return Err(ServiceError::denied("invalid bot key"));
        };
        if !bot.is_active {
            return Err(ServiceError::denied("bot is inactive"));
        }
        let channel = self.channel(channel_id)?;
        if channel.community_id != bot.community_id {
            return Err(ServiceError::denied("bot cannot post outside its community"));
        }

        self.post(NewMessage {
            channel_id: channel.id,
            user_id: bot.author_id(),
            username: bot.name,
            content: content.to_string(),
            is_bot: true,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn keys_have_prefix_and_only_digest_is_stored() {
        let svc = service();
        let (c, _) = community(&svc);
        let (bot, key) = svc.create_bot(&c.id, &alice(), "signals", None).unwrap();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + 64);
        assert!(svc.db().get_bot_by_key_hash(&key).unwrap().is_none());
        assert_eq!(
            svc.db().get_bot_by_key_hash(&hash_api_key(&key)).unwrap().unwrap().id,
            bot.id
        );
    }

    #[test]
    fn bot_posts_as_its_own_identity() {
        let svc = service();
        let (c, ch) = community(&svc);
        let (bot, key) = svc.create_bot(&c.id, &alice(), "signals", None).unwrap();
        let view = svc.send_bot_message(&key, &ch, "BTC up 3%").unwrap();
        assert!(view.message.is_bot);
        assert_eq!(view.message.user_id, format!("bot_{}", bot.id));
        assert_eq!(view.message.username, "signals");
    }

    #[test]
    fn inactive_unknown_and_foreign_are_unauthorized() {
        let svc = service();
        let (c, ch) = community(&svc);
        let (other, _) = community(&svc);
        let other_general = svc.list_channels(&other.id).unwrap()[0].id.clone();
        let (bot, key) = svc.create_bot(&c.id, &alice(), "signals", None).unwrap();

        let err = svc.send_bot_message("hub_bot_bogus", &ch, "hi").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        let err = svc.send_bot_message(&key, &other_general, "hi").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");

        svc.set_bot_active(&bot.id, &alice(), false).unwrap();
        let err = svc.send_bot_message(&key, &ch, "hi").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        assert!(svc.list_messages(&ch, 10, None).unwrap().is_empty());
    }

    #[test]
    fn members_cannot_manage_bots() {
        let svc = service();
        let (c, _) = community(&svc);
        let err = svc.create_bot(&c.id, &bob(), "rogue", None).unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
    }
}

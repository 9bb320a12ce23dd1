use hub_types::models::{CustomEmoji, Permission};
use tracing::info;

use crate::{Author, MessageService, ServiceError, ServiceResult};

impl MessageService {
    /// Names are 2-32 characters of `a-z`, `0-9` and `_`, unique per community.
    pub fn add_custom_emoji(
        &self,
        community_id: &str,
        actor: &Author,
        name: &str,
        url: &str,
    ) -> ServiceResult<CustomEmoji> {
        self.get_community(community_id)?;
        self.require_permission(community_id, &actor.user_id, Permission::ManageEmojis)?;
        if !valid_emoji_name(name) {
            return Err(ServiceError::invalid(
                "emoji names are 2-32 characters of a-z, 0-9 and _",
            ));
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(ServiceError::invalid("emoji url is required"));
        }

        let emoji = self
            .db()
            .add_custom_emoji(community_id, name, url, &actor.user_id)?
            .ok_or_else(|| ServiceError::invalid(format!("emoji :{name}: already exists")))?;
        info!(community_id, name, "Custom emoji added");
        Ok(emoji)
    }

    pub fn list_custom_emojis(&self, community_id: &str) -> ServiceResult<Vec<CustomEmoji>> {
        Ok(self.db().list_custom_emojis(community_id)?)
    }
}

fn valid_emoji_name(name: &str) -> bool {
    (2..=32).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::valid_emoji_name;
    use crate::testing::*;

    #[test]
    fn emoji_name_rules() {
        assert!(valid_emoji_name("party_parrot"));
        assert!(valid_emoji_name("a1"));
        assert!(!valid_emoji_name("x"));
        assert!(!valid_emoji_name("Party"));
        assert!(!valid_emoji_name("no-dash"));
        assert!(!valid_emoji_name(&"a".repeat(33)));
    }

    #[test]
    fn duplicate_names_and_missing_permission_are_rejected() {
        let svc = service();
        let (c, _) = community(&svc);
        svc.add_custom_emoji(&c.id, &alice(), "ferris", "https://cdn.example/f.png")
            .unwrap();
        let err = svc
            .add_custom_emoji(&c.id, &alice(), "ferris", "https://cdn.example/g.png")
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");

        let err = svc
            .add_custom_emoji(&c.id, &bob(), "crab", "https://cdn.example/c.png")
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        assert_eq!(svc.list_custom_emojis(&c.id).unwrap().len(), 1);
    }
}

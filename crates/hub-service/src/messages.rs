use hub_db::models::NewMessage;
use hub_types::models::{Attachment, Message, MessageView, Permission};
use tracing::{debug, info};

use crate::{Author, MAX_CONTENT_CHARS, MAX_PAGE, MessageService, ServiceError, ServiceResult};

impl MessageService {
    /// Posts to a channel. Either content or an attachment must be present.
    pub fn send_message(
        &self,
        channel_id: &str,
        author: &Author,
        content: &str,
        reply_to_id: Option<&str>,
        attachment: Option<Attachment>,
    ) -> ServiceResult<MessageView> {
        self.post(NewMessage {
            channel_id: channel_id.to_string(),
            user_id: author.user_id.clone(),
            username: author.username.clone(),
            content: content.to_string(),
            reply_to_id: reply_to_id.map(str::to_string),
            attachment,
            ..Default::default()
        })
    }

    /// Shared by human, bot and forwarded posts.
    pub(crate) fn post(&self, mut msg: NewMessage) -> ServiceResult<MessageView> {
        msg.content = msg.content.trim().to_string();
        if msg.content.is_empty() && msg.attachment.is_none() {
            return Err(ServiceError::invalid("message needs content or an attachment"));
        }
        if msg.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ServiceError::invalid(format!(
                "message is longer than {MAX_CONTENT_CHARS} characters"
            )));
        }
        if let Some(att) = &msg.attachment {
            if att.url.trim().is_empty() {
                return Err(ServiceError::invalid("attachment url is required"));
            }
        }
        if msg.user_id.is_empty() || msg.username.trim().is_empty() {
            return Err(ServiceError::invalid("author is required"));
        }

        self.channel(&msg.channel_id)?;
        if let Some(reply_to) = &msg.reply_to_id {
            self.db()
                .get_message(reply_to)?
                .ok_or_else(|| ServiceError::missing("replied-to message"))?;
        }

        let message = self.db().insert_message(&msg)?;
        debug!(message_id = %message.id, channel_id = %message.channel_id, "Message stored");
        self.view(message)
    }

    pub fn get_message(&self, message_id: &str) -> ServiceResult<Message> {
        self.db()
            .get_message(message_id)?
            .ok_or_else(|| ServiceError::missing("message"))
    }

    /// Only the author may edit; the edit stamps `editedAt`.
    pub fn edit_message(
        &self,
        message_id: &str,
        actor_id: &str,
        content: &str,
    ) -> ServiceResult<Message> {
        let existing = self.get_message(message_id)?;
        if existing.user_id != actor_id {
            return Err(ServiceError::denied("only the author can edit a message"));
        }
        let content = content.trim();
        if content.is_empty() && existing.attachment.is_none() {
            return Err(ServiceError::invalid("message needs content or an attachment"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ServiceError::invalid(format!(
                "message is longer than {MAX_CONTENT_CHARS} characters"
            )));
        }

        // the author guard is repeated in the UPDATE; a concurrent delete lands here
        self.db()
            .update_message_content(message_id, actor_id, content)?
            .ok_or_else(|| ServiceError::missing("message"))
    }

    /// Only the author may delete. Returns the removed message.
    pub fn delete_message(&self, message_id: &str, actor_id: &str) -> ServiceResult<Message> {
        let existing = self.get_message(message_id)?;
        if existing.user_id != actor_id {
            return Err(ServiceError::denied("only the author can delete a message"));
        }
        let deleted = self
            .db()
            .delete_message(message_id, actor_id)?
            .ok_or_else(|| ServiceError::missing("message"))?;
        info!(message_id, channel_id = %deleted.channel_id, "Message deleted");
        Ok(deleted)
    }

    /// The newest `limit` top-level messages before the `before` message, in
    /// ascending creation order.
    pub fn list_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> ServiceResult<Vec<MessageView>> {
        self.channel(channel_id)?;
        if let Some(before) = before {
            let cursor = self.get_message(before)?;
            if cursor.channel_id != channel_id {
                return Err(ServiceError::invalid("cursor belongs to another channel"));
            }
        }
        let limit = limit.clamp(1, MAX_PAGE);
        let messages = self.db().list_messages(channel_id, limit, before)?;
        self.views(messages)
    }

    pub fn search_messages(&self, channel_id: &str, query: &str) -> ServiceResult<Vec<Message>> {
        let query = search_query(query)?;
        self.channel(channel_id)?;
        Ok(self.db().search_messages(channel_id, query)?)
    }

    pub fn search_community_messages(
        &self,
        community_id: &str,
        query: &str,
    ) -> ServiceResult<Vec<Message>> {
        let query = search_query(query)?;
        self.get_community(community_id)?;
        Ok(self.db().search_community_messages(community_id, query)?)
    }

    /// Reposts a message's content and attachment into another channel as the
    /// actor, linked back to the source.
    pub fn forward_message(
        &self,
        message_id: &str,
        target_channel_id: &str,
        actor: &Author,
    ) -> ServiceResult<MessageView> {
        let source = self.get_message(message_id)?;
        let target = self.channel(target_channel_id)?;
        self.require_permission(&target.community_id, &actor.user_id, Permission::SendMessages)?;

        self.post(NewMessage {
            channel_id: target.id,
            user_id: actor.user_id.clone(),
            username: actor.username.clone(),
            content: source.content,
            forwarded_from_id: Some(source.id),
            attachment: source.attachment,
            ..Default::default()
        })
    }

    pub(crate) fn view(&self, message: Message) -> ServiceResult<MessageView> {
        let mut views = self.views(vec![message])?;
        views
            .pop()
            .ok_or_else(|| ServiceError::Store(anyhow::anyhow!("message view lost")))
    }

    /// Attaches reaction summaries and reply quotes.
    pub(crate) fn views(&self, messages: Vec<Message>) -> ServiceResult<Vec<MessageView>> {
        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let reply_ids: Vec<String> = messages
            .iter()
            .filter_map(|m| m.reply_to_id.clone())
            .collect();
        let mut reactions = self.db().reaction_summaries(&ids)?;
        let previews = self.db().reply_previews(&reply_ids)?;

        Ok(messages
            .into_iter()
            .map(|message| {
                let reply_to = message
                    .reply_to_id
                    .as_ref()
                    .and_then(|id| previews.get(id).cloned());
                MessageView {
                    reactions: reactions.remove(&message.id).unwrap_or_default(),
                    reply_to,
                    message,
                }
            })
            .collect())
    }
}

fn search_query(query: &str) -> ServiceResult<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ServiceError::invalid("search query is required"));
    }
    if query.chars().count() > 200 {
        return Err(ServiceError::invalid("search query is too long"));
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use hub_types::models::Attachment;

    #[test]
    fn empty_message_without_attachment_is_rejected() {
        let svc = service();
        let (_, ch) = community(&svc);
        let err = svc.send_message(&ch, &alice(), "   ", None, None).unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");

        let photo = Attachment {
            url: "https://cdn.example/p.png".into(),
            name: "p.png".into(),
            kind: "image".into(),
        };
        let view = svc.send_message(&ch, &alice(), "", None, Some(photo)).unwrap();
        assert_eq!(view.message.attachment.unwrap().name, "p.png");
    }

    #[test]
    fn unknown_channel_and_reply_target_are_not_found() {
        let svc = service();
        let (_, ch) = community(&svc);
        let err = svc.send_message("nope", &alice(), "hi", None, None).unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
        let err = svc.send_message(&ch, &alice(), "hi", Some("nope"), None).unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
    }

    #[test]
    fn reads_follow_insertion_order() {
        let svc = service();
        let (_, ch) = community(&svc);
        for i in 0..20 {
            let author = if i % 2 == 0 { alice() } else { bob() };
            svc.send_message(&ch, &author, &format!("msg {i}"), None, None).unwrap();
        }
        let page = svc.list_messages(&ch, 50, None).unwrap();
        let got: Vec<String> = page.iter().map(|v| v.message.content.clone()).collect();
        let want: Vec<String> = (0..20).map(|i| format!("msg {i}")).collect();
        assert_eq!(got, want);
        assert!(
            page.windows(2)
                .all(|w| w[0].message.created_at <= w[1].message.created_at)
        );
    }

    #[test]
    fn replies_carry_a_preview() {
        let svc = service();
        let (_, ch) = community(&svc);
        let first = svc.send_message(&ch, &alice(), "hello", None, None).unwrap();
        let reply = svc
            .send_message(&ch, &bob(), "hi!", Some(&first.message.id), None)
            .unwrap();
        let preview = reply.reply_to.unwrap();
        assert_eq!(preview.content, "hello");
        assert_eq!(preview.username, "alice");
    }

    #[test]
    fn only_the_author_edits() {
        let svc = service();
        let (_, ch) = community(&svc);
        let m = svc.send_message(&ch, &alice(), "hello", None, None).unwrap().message;

        let err = svc.edit_message(&m.id, "u3", "hello world").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        assert_eq!(svc.get_message(&m.id).unwrap().content, "hello");

        let edited = svc.edit_message(&m.id, "u1", "hello world").unwrap();
        assert_eq!(edited.content, "hello world");
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn delete_cascades_to_pins_threads_and_reactions() {
        let svc = service();
        let (c, ch) = community(&svc);
        let m = svc.send_message(&ch, &alice(), "hello", None, None).unwrap().message;
        svc.add_reaction(&m.id, &bob(), "👍").unwrap();
        svc.pin_message(&m.id, &alice()).unwrap();
        svc.add_thread_reply(&m.id, &bob(), "in thread").unwrap();

        assert_eq!(
            svc.delete_message(&m.id, "u2").unwrap_err().kind().as_str(),
            "unauthorized"
        );
        let gone = svc.delete_message(&m.id, "u1").unwrap();
        assert_eq!(gone.channel_id, ch);

        assert!(svc.list_pinned_messages(&ch).unwrap().is_empty());
        assert!(svc.db().get_thread(&m.id).unwrap().is_none());
        assert!(svc.db().reaction_summary(&m.id).unwrap().is_empty());
        assert!(svc.search_community_messages(&c.id, "thread").unwrap().is_empty());
        assert_eq!(
            svc.delete_message(&m.id, "u1").unwrap_err().kind().as_str(),
            "not_found"
        );
    }

    #[test]
    fn forward_copies_into_target_channel() {
        let svc = service();
        let (c, ch) = community(&svc);
        let announcements = svc.list_channels(&c.id).unwrap()[1].id.clone();
        let m = svc.send_message(&ch, &bob(), "big news", None, None).unwrap().message;

        let fwd = svc.forward_message(&m.id, &announcements, &alice()).unwrap().message;
        assert_eq!(fwd.channel_id, announcements);
        assert_eq!(fwd.user_id, "u1");
        assert_eq!(fwd.content, "big news");
        assert_eq!(fwd.forwarded_from_id.as_deref(), Some(m.id.as_str()));

        let outsider = crate::Author::new("u9", "mallory");
        let err = svc.forward_message(&m.id, &announcements, &outsider).unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
    }

    #[test]
    fn paging_cursor_must_exist() {
        let svc = service();
        let (_, ch) = community(&svc);
        let err = svc.list_messages(&ch, 10, Some("missing")).unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
    }

    #[test]
    fn blank_search_is_rejected() {
        let svc = service();
        let (_, ch) = community(&svc);
        assert_eq!(
            svc.search_messages(&ch, " ").unwrap_err().kind().as_str(),
            "validation"
        );
    }
}

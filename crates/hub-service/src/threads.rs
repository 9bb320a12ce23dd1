use hub_db::models::NewMessage;
use hub_types::models::{Message, MessageThread, MessageView, Permission};
use tracing::debug;

use crate::{Author, MessageService, ServiceError, ServiceResult};

impl MessageService {
    /// Starts a thread under a top-level message. Calling it again returns the
    /// existing thread.
    pub fn create_thread(&self, message_id: &str, actor: &Author) -> ServiceResult<MessageThread> {
        let parent = self.thread_parent(message_id, actor)?;
        Ok(self.db().ensure_thread(&parent.id)?)
    }

    pub fn add_thread_reply(
        &self,
        parent_id: &str,
        author: &Author,
        content: &str,
    ) -> ServiceResult<(MessageView, MessageThread)> {
        let parent = self.thread_parent(parent_id, author)?;
        let content = crate::required_text("reply", content, crate::MAX_CONTENT_CHARS)?;

        let (message, thread) = self.db().add_thread_reply(&NewMessage {
            channel_id: parent.channel_id,
            user_id: author.user_id.clone(),
            username: author.username.clone(),
            content,
            thread_parent_id: Some(parent.id),
            ..Default::default()
        })?;
        debug!(parent_id, reply_count = thread.reply_count, "Thread reply stored");
        Ok((self.view(message)?, thread))
    }

    pub fn get_thread(&self, parent_id: &str) -> ServiceResult<MessageThread> {
        self.db()
            .get_thread(parent_id)?
            .ok_or_else(|| ServiceError::missing("thread"))
    }

    pub fn list_thread_replies(&self, parent_id: &str) -> ServiceResult<Vec<MessageView>> {
        self.get_message(parent_id)?;
        let replies = self.db().list_thread_replies(parent_id)?;
        self.views(replies)
    }

    fn thread_parent(&self, message_id: &str, actor: &Author) -> ServiceResult<Message> {
        let parent = self.get_message(message_id)?;
        if parent.thread_parent_id.is_some() {
            return Err(ServiceError::invalid("threads cannot be nested"));
        }
        let channel = self.channel(&parent.channel_id)?;
        self.require_permission(&channel.community_id, &actor.user_id, Permission::CreateThreads)?;
        Ok(parent)
    }
}

use chrono::{DateTime, Utc};
use hub_types::models::{MessageView, ScheduledMessage};
use tracing::{info, warn};

use crate::{Author, MAX_CONTENT_CHARS, MessageService, ServiceError, ServiceResult, required_text};

impl MessageService {
    pub fn schedule_message(
        &self,
        channel_id: &str,
        author: &Author,
        content: &str,
        scheduled_for: DateTime<Utc>,
    ) -> ServiceResult<ScheduledMessage> {
        let content = required_text("content", content, MAX_CONTENT_CHARS)?;
        if scheduled_for <= Utc::now() {
            return Err(ServiceError::invalid("scheduled time must be in the future"));
        }
        self.channel(channel_id)?;

        let scheduled = self.db().insert_scheduled_message(
            channel_id,
            &author.user_id,
            &author.username,
            &content,
            &scheduled_for,
        )?;
        info!(scheduled_id = %scheduled.id, channel_id, %scheduled_for, "Message scheduled");
        Ok(scheduled)
    }

    /// Only the user who scheduled a message may cancel it. Returns `false`
    /// when it had already been sent or cancelled.
    pub fn cancel_scheduled_message(&self, id: &str, actor_id: &str) -> ServiceResult<bool> {
        let scheduled = self
            .db()
            .get_scheduled_message(id)?
            .ok_or_else(|| ServiceError::missing("scheduled message"))?;
        if scheduled.user_id != actor_id {
            return Err(ServiceError::denied(
                "only the scheduler can cancel a scheduled message",
            ));
        }
        Ok(self.db().cancel_scheduled_message(id)?)
    }

    pub fn list_scheduled_messages(&self, user_id: &str) -> ServiceResult<Vec<ScheduledMessage>> {
        Ok(self.db().list_pending_scheduled(user_id)?)
    }

    /// Posts every pending message due at `now`. Each one is claimed and
    /// posted atomically, so overlapping sweeps never post twice. A failing
    /// entry is logged and left for the next sweep.
    pub fn process_scheduled_messages(&self, now: DateTime<Utc>) -> ServiceResult<Vec<MessageView>> {
        let due = self.db().due_scheduled_messages(&now)?;
        let mut posted = Vec::with_capacity(due.len());
        for scheduled in due {
            match self.db().dispatch_scheduled_message(&scheduled.id) {
                Ok(Some(message)) => {
                    info!(scheduled_id = %scheduled.id, message_id = %message.id, "Scheduled message sent");
                    // already committed as sent, so it goes out even without its summaries
                    let view = match self.view(message.clone()) {
                        Ok(view) => view,
                        Err(e) => {
                            warn!(message_id = %message.id, "Scheduled message view failed: {e:#}");
                            MessageView {
                                message,
                                reactions: Vec::new(),
                                reply_to: None,
                            }
                        }
                    };
                    posted.push(view);
                }
                Ok(None) => {}
                Err(e) => warn!(scheduled_id = %scheduled.id, "Scheduled dispatch failed: {e:#}"),
            }
        }
        Ok(posted)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use chrono::{Duration, Utc};
    use hub_types::models::ScheduleStatus;

    #[test]
    fn message_appears_only_after_sweep_past_its_time() {
        let svc = service();
        let (_, ch) = community(&svc);
        let at = Utc::now() + Duration::seconds(1);
        let s = svc.schedule_message(&ch, &alice(), "good morning", at).unwrap();

        assert!(svc.process_scheduled_messages(Utc::now()).unwrap().is_empty());
        assert!(svc.list_messages(&ch, 50, None).unwrap().is_empty());

        let posted = svc
            .process_scheduled_messages(at + Duration::milliseconds(10))
            .unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].message.content, "good morning");
        assert_eq!(posted[0].message.user_id, "u1");
        assert!(!posted[0].message.is_bot);

        let listed = svc.list_messages(&ch, 50, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message.id, posted[0].message.id);

        // a second sweep finds nothing left to send
        assert!(
            svc.process_scheduled_messages(at + Duration::seconds(5))
                .unwrap()
                .is_empty()
        );
        let row = svc.db().get_scheduled_message(&s.id).unwrap().unwrap();
        assert_eq!(row.status, ScheduleStatus::Sent);
    }

    #[test]
    fn sent_entries_are_returned_when_decoration_fails() {
        let svc = service();
        let (_, ch) = community(&svc);
        let at = Utc::now() + Duration::seconds(1);
        svc.schedule_message(&ch, &alice(), "first", at).unwrap();
        svc.schedule_message(&ch, &bob(), "second", at).unwrap();
        svc.db()
            .with_conn(|c| Ok(c.execute_batch("DROP TABLE reactions")?))
            .unwrap();

        let posted = svc
            .process_scheduled_messages(at + Duration::milliseconds(10))
            .unwrap();
        let mut contents: Vec<&str> = posted.iter().map(|v| v.message.content.as_str()).collect();
        contents.sort();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(posted.iter().all(|v| v.reactions.is_empty()));
    }

    #[test]
    fn cancel_is_owner_only_and_final() {
        let svc = service();
        let (_, ch) = community(&svc);
        let at = Utc::now() + Duration::minutes(10);
        let s = svc.schedule_message(&ch, &alice(), "later", at).unwrap();

        let err = svc.cancel_scheduled_message(&s.id, "u2").unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");

        assert!(svc.cancel_scheduled_message(&s.id, "u1").unwrap());
        assert!(!svc.cancel_scheduled_message(&s.id, "u1").unwrap());
        assert!(
            svc.process_scheduled_messages(at + Duration::minutes(1))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn past_times_and_blank_content_are_rejected() {
        let svc = service();
        let (_, ch) = community(&svc);
        let past = Utc::now() - Duration::seconds(1);
        assert!(svc.schedule_message(&ch, &alice(), "late", past).is_err());
        let future = Utc::now() + Duration::minutes(1);
        assert!(svc.schedule_message(&ch, &alice(), " ", future).is_err());
    }
}

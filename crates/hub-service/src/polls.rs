use chrono::{DateTime, Utc};
use hub_db::models::NewPoll;
use hub_types::models::{Permission, Poll, PollResults};
use tracing::info;

use crate::{Author, MessageService, ServiceError, ServiceResult, required_text};

const MAX_OPTIONS: usize = 10;

impl MessageService {
    pub fn create_poll(
        &self,
        channel_id: &str,
        actor: &Author,
        question: &str,
        options: &[String],
        allow_multiple: bool,
        ends_at: Option<DateTime<Utc>>,
    ) -> ServiceResult<Poll> {
        let channel = self.channel(channel_id)?;
        self.require_permission(&channel.community_id, &actor.user_id, Permission::CreatePolls)?;

        let question = required_text("question", question, 300)?;
        let options: Vec<String> = options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if options.len() < 2 {
            return Err(ServiceError::invalid("a poll needs at least two options"));
        }
        if options.len() > MAX_OPTIONS {
            return Err(ServiceError::invalid(format!(
                "a poll has at most {MAX_OPTIONS} options"
            )));
        }
        if ends_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ServiceError::invalid("poll end must be in the future"));
        }

        let poll = self.db().create_poll(&NewPoll {
            channel_id: channel.id,
            creator_id: actor.user_id.clone(),
            question,
            options,
            allow_multiple,
            ends_at,
        })?;
        info!(poll_id = %poll.id, channel_id, "Poll created");
        Ok(poll)
    }

    /// Single-choice polls keep only the latest vote per user.
    pub fn vote_poll(
        &self,
        poll_id: &str,
        actor_id: &str,
        option_index: usize,
    ) -> ServiceResult<PollResults> {
        let poll = self
            .db()
            .get_poll(poll_id)?
            .ok_or_else(|| ServiceError::missing("poll"))?;
        if poll.ends_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ServiceError::invalid("poll has ended"));
        }
        if option_index >= poll.options.len() {
            return Err(ServiceError::invalid(format!(
                "option {option_index} is out of range"
            )));
        }

        self.db()
            .cast_vote(poll_id, actor_id, option_index, !poll.allow_multiple)?;
        self.get_poll_results(poll_id)
    }

    pub fn get_poll_results(&self, poll_id: &str) -> ServiceResult<PollResults> {
        self.db()
            .poll_results(poll_id)?
            .ok_or_else(|| ServiceError::missing("poll"))
    }

    pub fn list_polls(&self, channel_id: &str) -> ServiceResult<Vec<Poll>> {
        self.channel(channel_id)?;
        Ok(self.db().list_polls(channel_id)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use chrono::{Duration, Utc};
    use hub_types::models::OptionTally;

    fn opts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_voters_split_across_options() {
        let svc = service();
        let (_, ch) = community(&svc);
        let poll = svc
            .create_poll(&ch, &alice(), "Pick one", &opts(&["A", "B"]), false, None)
            .unwrap();
        svc.vote_poll(&poll.id, "u2", 0).unwrap();
        let results = svc.vote_poll(&poll.id, "u3", 1).unwrap();
        assert_eq!(
            results.votes,
            vec![
                OptionTally { option_index: 0, count: 1 },
                OptionTally { option_index: 1, count: 1 },
            ]
        );
    }

    #[test]
    fn single_choice_revote_replaces() {
        let svc = service();
        let (_, ch) = community(&svc);
        let poll = svc
            .create_poll(&ch, &alice(), "Pick one", &opts(&["A", "B"]), false, None)
            .unwrap();
        svc.vote_poll(&poll.id, "u2", 0).unwrap();
        let results = svc.vote_poll(&poll.id, "u2", 1).unwrap();
        assert_eq!(svc.db().count_user_votes(&poll.id, "u2").unwrap(), 1);
        assert_eq!(results.votes[0].count, 0);
        assert_eq!(results.votes[1].count, 1);
    }

    #[test]
    fn bad_polls_and_votes_are_rejected() {
        let svc = service();
        let (_, ch) = community(&svc);
        let err = svc
            .create_poll(&ch, &alice(), "Only one?", &opts(&["A", "  "]), false, None)
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");

        let poll = svc
            .create_poll(&ch, &alice(), "Q", &opts(&["A", "B"]), false, None)
            .unwrap();
        let err = svc.vote_poll(&poll.id, "u2", 2).unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
        let err = svc.vote_poll("missing", "u2", 0).unwrap_err();
        assert_eq!(err.kind().as_str(), "not_found");
    }

    #[test]
    fn past_end_time_is_rejected() {
        let svc = service();
        let (_, ch) = community(&svc);
        let past = Utc::now() - Duration::minutes(1);
        let err = svc
            .create_poll(&ch, &alice(), "Q", &opts(&["A", "B"]), false, Some(past))
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "validation");
    }

    #[test]
    fn outsiders_cannot_create_polls() {
        let svc = service();
        let (_, ch) = community(&svc);
        let outsider = crate::Author::new("u9", "mallory");
        let err = svc
            .create_poll(&ch, &outsider, "Q", &opts(&["A", "B"]), false, None)
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "unauthorized");
        assert!(svc.list_polls(&ch).unwrap().is_empty());
    }
}

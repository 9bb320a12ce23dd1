//! Store-only row types. Everything the service hands back to callers is a
//! `hub_types::models` value; these cover inputs and secrets that never leave the store.

use hub_types::models::Attachment;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

/// A message to insert. `created_at` is assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub thread_parent_id: Option<String>,
    pub forwarded_from_id: Option<String>,
    pub is_bot: bool,
    pub attachment: Option<Attachment>,
}

pub struct NewPoll {
    pub channel_id: String,
    pub creator_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    pub ends_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed { community_id: String, joined: bool },
    Unknown,
    Expired,
    Exhausted,
}

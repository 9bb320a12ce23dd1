use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub is_public: bool,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Chat,
    Announcement,
    Bot,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Announcement => "announcement",
            Self::Bot => "bot",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "announcement" => Ok(Self::Announcement),
            "bot" => Ok(Self::Bot),
            other => Err(format!("unknown channel kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub community_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub position: i64,
    pub is_locked: bool,
}

/// Role name carried by the community creator. Never stored in `roles`.
pub const OWNER_ROLE: &str = "owner";
/// Role every joining member starts with.
pub const MEMBER_ROLE: &str = "member";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub community_id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub thread_parent_id: Option<String>,
    pub forwarded_from_id: Option<String>,
    pub is_bot: bool,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// Short quote of the message being replied to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
}

/// A message as shown in a channel timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub reactions: Vec<ReactionSummary>,
    pub reply_to: Option<ReplyPreview>,
}

/// Every reaction on a message for one emoji. Always the full state, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedMessage {
    pub message_id: String,
    pub channel_id: String,
    pub pinned_by_id: String,
    pub pinned_at: DateTime<Utc>,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub channel_id: String,
    pub creator_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub allow_multiple: bool,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub option_index: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    pub poll: Poll,
    pub votes: Vec<OptionTally>,
    pub total_votes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SendMessages,
    AddReactions,
    CreateThreads,
    CreatePolls,
    PinMessages,
    ManageMessages,
    ManageChannels,
    ManageRoles,
    ManageEmojis,
    ManageBots,
    CreateInvites,
}

impl Permission {
    pub const ALL: [Permission; 11] = [
        Self::SendMessages,
        Self::AddReactions,
        Self::CreateThreads,
        Self::CreatePolls,
        Self::PinMessages,
        Self::ManageMessages,
        Self::ManageChannels,
        Self::ManageRoles,
        Self::ManageEmojis,
        Self::ManageBots,
        Self::CreateInvites,
    ];

    /// What the implicit `member` role may do when no stored role overrides it.
    pub const MEMBER_DEFAULTS: [Permission; 4] = [
        Self::SendMessages,
        Self::AddReactions,
        Self::CreateThreads,
        Self::CreatePolls,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessages => "send_messages",
            Self::AddReactions => "add_reactions",
            Self::CreateThreads => "create_threads",
            Self::CreatePolls => "create_polls",
            Self::PinMessages => "pin_messages",
            Self::ManageMessages => "manage_messages",
            Self::ManageChannels => "manage_channels",
            Self::ManageRoles => "manage_roles",
            Self::ManageEmojis => "manage_emojis",
            Self::ManageBots => "manage_bots",
            Self::CreateInvites => "create_invites",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub community_id: String,
    pub name: String,
    pub color: String,
    pub permissions: Vec<Permission>,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmConversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl DmConversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown schedule status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub sent_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageThread {
    pub parent_message_id: String,
    pub reply_count: i64,
    pub last_reply_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEmoji {
    pub id: String,
    pub community_id: String,
    pub name: String,
    pub url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: String,
    pub community_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// Author id used for messages this bot posts.
    pub fn author_id(&self) -> String {
        format!("bot_{}", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: String,
    pub community_id: String,
    pub code: String,
    pub created_by: String,
    pub max_uses: Option<i64>,
    pub uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An identity currently connected to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_strings_round_trip() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), p);
            assert_eq!(serde_json::to_value(p).unwrap(), p.as_str());
        }
        assert!("fly".parse::<Permission>().is_err());
    }

    #[test]
    fn message_view_flattens_message_fields() {
        let view = MessageView {
            message: Message {
                id: "m1".into(),
                channel_id: "c1".into(),
                user_id: "u1".into(),
                username: "alice".into(),
                content: "hello".into(),
                reply_to_id: None,
                thread_parent_id: None,
                forwarded_from_id: None,
                is_bot: false,
                attachment: None,
                created_at: Utc::now(),
                edited_at: None,
            },
            reactions: vec![],
            reply_to: None,
        };
        let v = serde_json::to_value(&view).unwrap();
        assert_eq!(v["channelId"], "c1");
        assert_eq!(v["content"], "hello");
        assert!(v["reactions"].as_array().unwrap().is_empty());
    }
}

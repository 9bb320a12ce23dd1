use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use hub_types::models::OnlineUser;

/// Which identities hold connections to which channel.
///
/// Entries are keyed by connection, so one user may appear under several
/// connections. The in-process implementation is the only one today; fanout
/// is therefore limited to connections held by this process.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn register(&self, channel_id: &str, conn_id: Uuid, user: OnlineUser);

    /// Returns the identity the connection was registered with, if any.
    async fn unregister(&self, channel_id: &str, conn_id: Uuid) -> Option<OnlineUser>;

    /// One entry per user, however many connections they hold.
    async fn list_online(&self, channel_id: &str) -> Vec<OnlineUser>;

    /// Every registered connection of a channel.
    async fn connections(&self, channel_id: &str) -> Vec<(Uuid, OnlineUser)>;
}

#[derive(Default)]
pub struct InMemoryPresence {
    channels: RwLock<HashMap<String, HashMap<Uuid, OnlineUser>>>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresence {
    async fn register(&self, channel_id: &str, conn_id: Uuid, user: OnlineUser) {
        self.channels
            .write()
            .await
            .entry(channel_id.to_string())
            .or_default()
            .insert(conn_id, user);
    }

    async fn unregister(&self, channel_id: &str, conn_id: Uuid) -> Option<OnlineUser> {
        let mut channels = self.channels.write().await;
        let conns = channels.get_mut(channel_id)?;
        let removed = conns.remove(&conn_id);
        if conns.is_empty() {
            channels.remove(channel_id);
        }
        removed
    }

    async fn list_online(&self, channel_id: &str) -> Vec<OnlineUser> {
        let channels = self.channels.read().await;
        let Some(conns) = channels.get(channel_id) else {
            return Vec::new();
        };

        let mut by_user: HashMap<&str, &OnlineUser> = HashMap::new();
        for user in conns.values() {
            by_user.entry(user.user_id.as_str()).or_insert(user);
        }
        let mut users: Vec<OnlineUser> = by_user.into_values().cloned().collect();
        users.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        users
    }

    async fn connections(&self, channel_id: &str) -> Vec<(Uuid, OnlineUser)> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map(|conns| conns.iter().map(|(id, u)| (*id, u.clone())).collect())
            .unwrap_or_default()
    }
}

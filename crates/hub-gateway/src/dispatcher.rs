use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{trace, warn};
use uuid::Uuid;

use hub_types::events::ServerEvent;

use crate::presence::{InMemoryPresence, PresenceRegistry};

/// Serialized frame shared by every connection it is delivered to.
pub type Frame = Arc<str>;

/// Routes server events to the connections subscribed to a channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    presence: Arc<dyn PresenceRegistry>,

    /// Outbox per live connection: conn_id -> sender
    outboxes: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Frame>>>,

    /// Joined connections per (community_id, user_id), across all channels
    member_links: RwLock<HashMap<(String, String), usize>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryPresence::new()))
    }
}

impl Dispatcher {
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                presence,
                outboxes: RwLock::new(HashMap::new()),
                member_links: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn presence(&self) -> &dyn PresenceRegistry {
        self.inner.presence.as_ref()
    }

    /// Opens an outbox for a new connection. Returns (conn_id, receiver).
    pub async fn register_connection(&self) -> (Uuid, mpsc::UnboundedReceiver<Frame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.outboxes.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    pub async fn unregister_connection(&self, conn_id: Uuid) {
        self.inner.outboxes.write().await.remove(&conn_id);
    }

    /// Counts one more connection of the user inside the community.
    /// Returns the new count.
    pub async fn link_member(&self, community_id: &str, user_id: &str) -> usize {
        let mut links = self.inner.member_links.write().await;
        let count = links
            .entry((community_id.to_string(), user_id.to_string()))
            .or_default();
        *count += 1;
        *count
    }

    /// Drops one connection of the user from the community. Returns how many
    /// are left; zero means the member is no longer connected anywhere in it.
    pub async fn unlink_member(&self, community_id: &str, user_id: &str) -> usize {
        let mut links = self.inner.member_links.write().await;
        let key = (community_id.to_string(), user_id.to_string());
        let Some(count) = links.get_mut(&key) else {
            return 0;
        };
        *count = count.saturating_sub(1);
        let left = *count;
        if left == 0 {
            links.remove(&key);
        }
        left
    }

    /// Sends an event to every connection registered for `channel_id`,
    /// skipping all connections of `exclude_user`. Returns the delivery count.
    pub async fn broadcast_to_channel(
        &self,
        channel_id: &str,
        event: &ServerEvent,
        exclude_user: Option<&str>,
    ) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let targets = self.inner.presence.connections(channel_id).await;
        let outboxes = self.inner.outboxes.read().await;
        let mut delivered = 0;
        for (conn_id, user) in targets {
            if exclude_user == Some(user.user_id.as_str()) {
                continue;
            }
            if let Some(tx) = outboxes.get(&conn_id) {
                if tx.send(frame.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(channel_id, delivered, "Broadcast");
        delivered
    }

    /// Sends an event to one connection only.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: &ServerEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let outboxes = self.inner.outboxes.read().await;
        outboxes
            .get(&conn_id)
            .is_some_and(|tx| tx.send(frame).is_ok())
    }
}

fn encode(event: &ServerEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!("Failed to serialize server event: {}", e);
            None
        }
    }
}

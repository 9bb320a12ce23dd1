use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use hub_types::models::PinnedMessage;

use crate::messages::message_from_row;
use crate::{Database, fmt_ts, ts_at};

impl Database {
    /// Returns `false` when the message was already pinned.
    pub fn pin_message(&self, message_id: &str, channel_id: &str, pinned_by: &str) -> Result<bool> {
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pinned_messages (message_id, channel_id, pinned_by, pinned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![message_id, channel_id, pinned_by, now],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns `false` when the message was not pinned.
    pub fn unpin_message(&self, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed =
                conn.execute("DELETE FROM pinned_messages WHERE message_id = ?1", [message_id])?;
            Ok(removed > 0)
        })
    }

    /// Most recently pinned first.
    pub fn list_pinned_messages(&self, channel_id: &str) -> Result<Vec<PinnedMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.channel_id, m.user_id, m.username, m.content, m.reply_to_id,
                        m.thread_parent_id, m.forwarded_from_id, m.is_bot, m.created_at, m.edited_at,
                        a.url, a.filename, a.kind,
                        p.pinned_by, p.pinned_at
                 FROM pinned_messages p
                 JOIN messages m ON m.id = p.message_id
                 LEFT JOIN attachments a ON a.message_id = m.id
                 WHERE p.channel_id = ?1
                 ORDER BY p.pinned_at DESC",
            )?;
            let rows = stmt.query_map([channel_id], |row| {
                let message = message_from_row(row)?;
                Ok(PinnedMessage {
                    message_id: message.id.clone(),
                    channel_id: message.channel_id.clone(),
                    pinned_by_id: row.get(14)?,
                    pinned_at: ts_at(row, 15)?,
                    message,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

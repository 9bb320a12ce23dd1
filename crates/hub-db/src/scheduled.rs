use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{Message, ScheduleStatus, ScheduledMessage};

use crate::messages::insert_message_tx;
use crate::models::NewMessage;
use crate::{Database, fmt_ts, new_id, parsed_at, ts_at};

const SCHEDULED_COLUMNS: &str =
    "id, channel_id, user_id, username, content, scheduled_for, status, sent_message_id, created_at";

impl Database {
    pub fn insert_scheduled_message(
        &self,
        channel_id: &str,
        user_id: &str,
        username: &str,
        content: &str,
        scheduled_for: &DateTime<Utc>,
    ) -> Result<ScheduledMessage> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scheduled_messages (id, channel_id, user_id, username, content, scheduled_for, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
                params![id, channel_id, user_id, username, content, fmt_ts(scheduled_for), now],
            )?;
            query_scheduled(conn, &id)?
                .ok_or_else(|| anyhow::anyhow!("scheduled message {id} vanished after insert"))
        })
    }

    pub fn get_scheduled_message(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        self.with_conn(|conn| query_scheduled(conn, id))
    }

    /// Pending messages a user has queued, soonest first.
    pub fn list_pending_scheduled(&self, user_id: &str) -> Result<Vec<ScheduledMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages
                 WHERE user_id = ?1 AND status = 'pending'
                 ORDER BY scheduled_for ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], scheduled_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// pending -> cancelled. `false` when the row is missing or already left
    /// the pending state.
    pub fn cancel_scheduled_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE scheduled_messages SET status = 'cancelled'
                 WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Pending messages whose time has come, oldest schedule first.
    pub fn due_scheduled_messages(&self, now: &DateTime<Utc>) -> Result<Vec<ScheduledMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages
                 WHERE status = 'pending' AND scheduled_for <= ?1
                 ORDER BY scheduled_for ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([fmt_ts(now)], scheduled_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// pending -> sent, posting the message in the same transaction. `None`
    /// when another caller already moved the row out of pending.
    pub fn dispatch_scheduled_message(&self, id: &str) -> Result<Option<Message>> {
        self.with_tx(|tx| {
            let claimed = tx.execute(
                "UPDATE scheduled_messages SET status = 'sent'
                 WHERE id = ?1 AND status = 'pending'",
                [id],
            )?;
            if claimed == 0 {
                return Ok(None);
            }
            let Some(pending) = query_scheduled(tx, id)? else {
                return Ok(None);
            };

            let message = insert_message_tx(
                tx,
                &NewMessage {
                    channel_id: pending.channel_id,
                    user_id: pending.user_id,
                    username: pending.username,
                    content: pending.content,
                    ..Default::default()
                },
            )?;
            tx.execute(
                "UPDATE scheduled_messages SET sent_message_id = ?1 WHERE id = ?2",
                (&message.id, id),
            )?;
            Ok(Some(message))
        })
    }
}

fn query_scheduled(conn: &Connection, id: &str) -> Result<Option<ScheduledMessage>> {
    let sql = format!("SELECT {SCHEDULED_COLUMNS} FROM scheduled_messages WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], scheduled_from_row).optional()?)
}

fn scheduled_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    Ok(ScheduledMessage {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        scheduled_for: ts_at(row, 5)?,
        status: parsed_at::<ScheduleStatus>(row, 6)?,
        sent_message_id: row.get(7)?,
        created_at: ts_at(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_community("u1", "alice", "c", None, true).unwrap();
        let ch = db.list_channels(&c.id).unwrap()[0].id.clone();
        (db, ch)
    }

    #[test]
    fn dispatch_posts_once() {
        let (db, ch) = setup();
        let at = Utc::now() - Duration::seconds(1);
        let s = db.insert_scheduled_message(&ch, "u1", "alice", "standup", &at).unwrap();

        let due = db.due_scheduled_messages(&Utc::now()).unwrap();
        assert_eq!(due.len(), 1);

        let posted = db.dispatch_scheduled_message(&s.id).unwrap().unwrap();
        assert_eq!(posted.content, "standup");
        assert!(db.dispatch_scheduled_message(&s.id).unwrap().is_none());

        let row = db.get_scheduled_message(&s.id).unwrap().unwrap();
        assert_eq!(row.status, ScheduleStatus::Sent);
        assert_eq!(row.sent_message_id.as_deref(), Some(posted.id.as_str()));
        assert!(!db.cancel_scheduled_message(&s.id).unwrap());
    }

    #[test]
    fn cancelled_messages_never_fire() {
        let (db, ch) = setup();
        let at = Utc::now() + Duration::hours(1);
        let s = db.insert_scheduled_message(&ch, "u1", "alice", "later", &at).unwrap();
        assert!(db.due_scheduled_messages(&Utc::now()).unwrap().is_empty());

        assert!(db.cancel_scheduled_message(&s.id).unwrap());
        assert!(!db.cancel_scheduled_message(&s.id).unwrap());
        assert!(db.dispatch_scheduled_message(&s.id).unwrap().is_none());
        assert!(db.due_scheduled_messages(&(at + Duration::hours(1))).unwrap().is_empty());
    }
}

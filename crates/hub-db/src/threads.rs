use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use hub_types::models::{Message, MessageThread};

use crate::messages::insert_message_tx;
use crate::models::NewMessage;
use crate::{Database, fmt_ts, opt_ts_at};

impl Database {
    /// Creates the thread row for a message if it has none yet.
    pub fn ensure_thread(&self, parent_message_id: &str) -> Result<MessageThread> {
        self.with_conn(|conn| {
            ensure_thread_tx(conn, parent_message_id)?;
            query_thread(conn, parent_message_id)?
                .ok_or_else(|| anyhow::anyhow!("thread {parent_message_id} vanished"))
        })
    }

    pub fn get_thread(&self, parent_message_id: &str) -> Result<Option<MessageThread>> {
        self.with_conn(|conn| query_thread(conn, parent_message_id))
    }

    /// Ensures the thread row, inserts the reply, then bumps the counter.
    pub fn add_thread_reply(&self, reply: &NewMessage) -> Result<(Message, MessageThread)> {
        let parent_id = reply
            .thread_parent_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("thread reply without a parent"))?;
        self.with_tx(|tx| {
            ensure_thread_tx(tx, &parent_id)?;
            let message = insert_message_tx(tx, reply)?;
            tx.execute(
                "UPDATE message_threads
                 SET reply_count = reply_count + 1, last_reply_at = ?1
                 WHERE parent_message_id = ?2",
                (fmt_ts(&message.created_at), &parent_id),
            )?;
            let thread = query_thread(tx, &parent_id)?
                .ok_or_else(|| anyhow::anyhow!("thread {parent_id} vanished"))?;
            Ok((message, thread))
        })
    }
}

fn ensure_thread_tx(conn: &Connection, parent_message_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO message_threads (parent_message_id, reply_count) VALUES (?1, 0)",
        [parent_message_id],
    )?;
    Ok(())
}

fn query_thread(conn: &Connection, parent_message_id: &str) -> Result<Option<MessageThread>> {
    Ok(conn
        .query_row(
            "SELECT parent_message_id, reply_count, last_reply_at
             FROM message_threads WHERE parent_message_id = ?1",
            [parent_message_id],
            |row| {
                Ok(MessageThread {
                    parent_message_id: row.get(0)?,
                    reply_count: row.get(1)?,
                    last_reply_at: opt_ts_at(row, 2)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_count_and_stay_out_of_the_timeline() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_community("u1", "alice", "c", None, true).unwrap();
        let ch = db.list_channels(&c.id).unwrap()[0].id.clone();
        let parent = db
            .insert_message(&NewMessage {
                channel_id: ch.clone(),
                user_id: "u1".into(),
                username: "alice".into(),
                content: "release plan".into(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(db.ensure_thread(&parent.id).unwrap().reply_count, 0);
        assert_eq!(db.ensure_thread(&parent.id).unwrap().reply_count, 0);

        for text in ["lgtm", "ship it"] {
            db.add_thread_reply(&NewMessage {
                channel_id: ch.clone(),
                user_id: "u2".into(),
                username: "bob".into(),
                content: text.into(),
                thread_parent_id: Some(parent.id.clone()),
                ..Default::default()
            })
            .unwrap();
        }

        let thread = db.get_thread(&parent.id).unwrap().unwrap();
        assert_eq!(thread.reply_count, 2);
        assert!(thread.last_reply_at.is_some());
        assert_eq!(db.list_thread_replies(&parent.id).unwrap().len(), 2);
        assert_eq!(db.list_messages(&ch, 50, None).unwrap().len(), 1);

        db.delete_message(&parent.id, "u1").unwrap();
        assert!(db.get_thread(&parent.id).unwrap().is_none());
        assert!(db.list_thread_replies(&parent.id).unwrap().is_empty());
    }
}

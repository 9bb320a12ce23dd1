use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{DirectMessage, DmConversation};

use crate::{Database, fmt_ts, new_id, opt_ts_at, ts_at};

const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, created_at, last_message_at";

impl Database {
    /// The single conversation between two users, created on first use.
    /// Argument order does not matter.
    pub fn get_or_create_conversation(&self, user_a: &str, user_b: &str) -> Result<DmConversation> {
        let (a, b) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
        let now = fmt_ts(&Utc::now());
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO dm_conversations (id, participant_a, participant_b, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new_id(), a, b, now],
            )?;
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM dm_conversations
                 WHERE participant_a = ?1 AND participant_b = ?2"
            );
            Ok(tx.query_row(&sql, [a, b], conversation_from_row)?)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<DmConversation>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Most recently active first; conversations without messages sort last.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<DmConversation>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM dm_conversations
                 WHERE participant_a = ?1 OR participant_b = ?1
                 ORDER BY COALESCE(last_message_at, created_at) DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user_id], conversation_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn insert_direct_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<DirectMessage> {
        let id = new_id();
        let now = Utc::now();
        let now_text = fmt_ts(&now);
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO direct_messages (id, conversation_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, conversation_id, sender_id, content, now_text],
            )?;
            tx.execute(
                "UPDATE dm_conversations SET last_message_at = ?1 WHERE id = ?2",
                (&now_text, conversation_id),
            )?;
            Ok(DirectMessage {
                id: id.clone(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                content: content.to_string(),
                created_at: now,
            })
        })
    }

    /// The newest `limit` messages, oldest first.
    pub fn list_direct_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<DirectMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM direct_messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![conversation_id, limit], |row| {
                Ok(DirectMessage {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    content: row.get(3)?,
                    created_at: ts_at(row, 4)?,
                })
            })?;
            let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<DmConversation>> {
    let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM dm_conversations WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], conversation_from_row).optional()?)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<DmConversation> {
    Ok(DmConversation {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: ts_at(row, 3)?,
        last_message_at: opt_ts_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_is_created_once_for_either_order() {
        let db = Database::open_in_memory().unwrap();
        let first = db.get_or_create_conversation("zed", "amy").unwrap();
        let second = db.get_or_create_conversation("amy", "zed").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participant_a, "amy");
        assert_eq!(db.list_conversations("zed").unwrap().len(), 1);
    }

    #[test]
    fn sending_updates_last_activity() {
        let db = Database::open_in_memory().unwrap();
        let quiet = db.get_or_create_conversation("u1", "u2").unwrap();
        let busy = db.get_or_create_conversation("u1", "u3").unwrap();
        db.insert_direct_message(&busy.id, "u3", "ping").unwrap();
        db.insert_direct_message(&busy.id, "u1", "pong").unwrap();

        let list = db.list_conversations("u1").unwrap();
        assert_eq!(list[0].id, busy.id);
        assert_eq!(list[1].id, quiet.id);

        let msgs = db.list_direct_messages(&busy.id, 50).unwrap();
        let got: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(got, ["ping", "pong"]);
    }
}

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{Attachment, Message, ReplyPreview};

use crate::models::NewMessage;
use crate::{Database, fmt_ts, new_id, opt_ts_at, ts_at};

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.channel_id, m.user_id, m.username, m.content, m.reply_to_id,
           m.thread_parent_id, m.forwarded_from_id, m.is_bot, m.created_at, m.edited_at,
           a.url, a.filename, a.kind
    FROM messages m
    LEFT JOIN attachments a ON a.message_id = m.id";

pub const SEARCH_LIMIT: u32 = 50;

impl Database {
    pub fn insert_message(&self, msg: &NewMessage) -> Result<Message> {
        self.with_tx(|tx| insert_message_tx(tx, msg))
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// The newest `limit` top-level messages of a channel, strictly older than
    /// `before` when given, returned oldest first.
    pub fn list_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?1
                   AND m.thread_parent_id IS NULL
                   AND (?2 IS NULL OR (m.created_at, m.rowid) <
                        (SELECT created_at, rowid FROM messages WHERE id = ?2))
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![channel_id, before, limit], message_from_row)?;
            let mut messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }

    /// Replaces the content when `user_id` authored the message. `None` means
    /// no row matched both.
    pub fn update_message_content(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<Option<Message>> {
        let now = fmt_ts(&Utc::now());
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3 AND user_id = ?4",
                params![content, now, id, user_id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_message(tx, id)
        })
    }

    /// Hard-deletes a message authored by `user_id`, returning what was removed.
    /// Attachment, reactions, pin, thread row and thread replies go with it.
    pub fn delete_message(&self, id: &str, user_id: &str) -> Result<Option<Message>> {
        self.with_tx(|tx| {
            let Some(existing) = query_message(tx, id)? else {
                return Ok(None);
            };
            let deleted = tx.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok((deleted > 0).then_some(existing))
        })
    }

    pub fn search_messages(&self, channel_id: &str, query: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?1 AND m.content LIKE ?2 ESCAPE '\\'
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![channel_id, like_pattern(query), SEARCH_LIMIT],
                message_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn search_community_messages(
        &self,
        community_id: &str,
        query: &str,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 JOIN channels ch ON ch.id = m.channel_id
                 WHERE ch.community_id = ?1 AND m.content LIKE ?2 ESCAPE '\\'
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![community_id, like_pattern(query), SEARCH_LIMIT],
                message_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn list_thread_replies(&self, parent_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.thread_parent_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([parent_id], message_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Quotes for the given message ids. Ids that no longer exist are absent.
    pub fn reply_previews(&self, ids: &[String]) -> Result<HashMap<String, ReplyPreview>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, user_id, username, content FROM messages WHERE id = ?1")?;
            let mut out = HashMap::new();
            for id in ids {
                if out.contains_key(id) {
                    continue;
                }
                let preview = stmt
                    .query_row([id], |row| {
                        Ok(ReplyPreview {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            username: row.get(2)?,
                            content: row.get(3)?,
                        })
                    })
                    .optional()?;
                if let Some(p) = preview {
                    out.insert(id.clone(), p);
                }
            }
            Ok(out)
        })
    }
}

/// Inserts a message and its attachment on an open connection or transaction.
/// The creation time never precedes the channel's latest message.
pub(crate) fn insert_message_tx(conn: &Connection, msg: &NewMessage) -> Result<Message> {
    let id = new_id();
    let latest: Option<String> = conn.query_row(
        "SELECT MAX(created_at) FROM messages WHERE channel_id = ?1",
        [&msg.channel_id],
        |row| row.get(0),
    )?;
    let now = fmt_ts(&Utc::now());
    let created_at = match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    };

    conn.execute(
        "INSERT INTO messages (id, channel_id, user_id, username, content, reply_to_id,
                               thread_parent_id, forwarded_from_id, is_bot, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            msg.channel_id,
            msg.user_id,
            msg.username,
            msg.content,
            msg.reply_to_id,
            msg.thread_parent_id,
            msg.forwarded_from_id,
            msg.is_bot,
            created_at,
        ],
    )?;

    if let Some(att) = &msg.attachment {
        conn.execute(
            "INSERT INTO attachments (message_id, url, kind, filename) VALUES (?1, ?2, ?3, ?4)",
            params![id, att.url, att.kind, att.name],
        )?;
    }

    query_message(conn, &id)?.ok_or_else(|| anyhow::anyhow!("message {id} vanished after insert"))
}

pub(crate) fn query_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    Ok(conn.query_row(&sql, [id], message_from_row).optional()?)
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let url: Option<String> = row.get(11)?;
    let attachment = match url {
        Some(url) => Some(Attachment {
            url,
            name: row.get(12)?,
            kind: row.get(13)?,
        }),
        None => None,
    };

    Ok(Message {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        reply_to_id: row.get(5)?,
        thread_parent_id: row.get(6)?,
        forwarded_from_id: row.get(7)?,
        is_bot: row.get(8)?,
        created_at: ts_at(row, 9)?,
        edited_at: opt_ts_at(row, 10)?,
        attachment,
    })
}

/// `%query%` with LIKE wildcards in the query matched literally.
fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

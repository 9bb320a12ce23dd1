use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};

use hub_types::models::ReactionSummary;

use crate::{Database, fmt_ts};

impl Database {
    /// Returns `false` when the triple already existed.
    pub fn add_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        username: &str,
        emoji: &str,
    ) -> Result<bool> {
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, username, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![message_id, user_id, username, emoji, now],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Returns `false` when there was nothing to remove.
    pub fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                (message_id, user_id, emoji),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn reaction_summary(&self, message_id: &str) -> Result<Vec<ReactionSummary>> {
        self.with_conn(|conn| query_reaction_summary(conn, message_id))
    }

    /// Summaries for many messages at once. Messages without reactions map to
    /// an empty list.
    pub fn reaction_summaries(
        &self,
        message_ids: &[String],
    ) -> Result<HashMap<String, Vec<ReactionSummary>>> {
        self.with_conn(|conn| {
            let mut out = HashMap::with_capacity(message_ids.len());
            for id in message_ids {
                out.insert(id.clone(), query_reaction_summary(conn, id)?);
            }
            Ok(out)
        })
    }
}

/// Groups by emoji in order of each emoji's first use; users in reaction order.
fn query_reaction_summary(conn: &Connection, message_id: &str) -> Result<Vec<ReactionSummary>> {
    let mut stmt = conn.prepare_cached(
        "SELECT emoji, user_id FROM reactions
         WHERE message_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map([message_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut groups: Vec<ReactionSummary> = Vec::new();
    for row in rows {
        let (emoji, user_id) = row?;
        match groups.iter_mut().find(|g| g.emoji == emoji) {
            Some(group) => {
                group.count += 1;
                group.users.push(user_id);
            }
            None => groups.push(ReactionSummary {
                emoji,
                count: 1,
                users: vec![user_id],
            }),
        }
    }
    Ok(groups)
}

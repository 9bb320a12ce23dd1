use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::Bot;

use crate::{Database, fmt_ts, new_id, ts_at};

const BOT_COLUMNS: &str = "id, community_id, name, description, is_active, created_at";

impl Database {
    /// Stores a bot under the digest of its API key; the key itself is never stored.
    pub fn create_bot(
        &self,
        community_id: &str,
        name: &str,
        description: Option<&str>,
        api_key_hash: &str,
    ) -> Result<Bot> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bots (id, community_id, name, description, api_key_hash, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![id, community_id, name, description, api_key_hash, now],
            )?;
            query_bot(conn, "id", &id)?.ok_or_else(|| anyhow::anyhow!("bot {id} vanished after insert"))
        })
    }

    pub fn get_bot(&self, id: &str) -> Result<Option<Bot>> {
        self.with_conn(|conn| query_bot(conn, "id", id))
    }

    pub fn get_bot_by_key_hash(&self, api_key_hash: &str) -> Result<Option<Bot>> {
        self.with_conn(|conn| query_bot(conn, "api_key_hash", api_key_hash))
    }

    pub fn list_bots(&self, community_id: &str) -> Result<Vec<Bot>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BOT_COLUMNS} FROM bots WHERE community_id = ?1 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], bot_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn set_bot_active(&self, id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let updated =
                conn.execute("UPDATE bots SET is_active = ?1 WHERE id = ?2", params![active, id])?;
            Ok(updated > 0)
        })
    }
}

/// `column` is one of the fixed lookup columns above, never caller input.
fn query_bot(conn: &Connection, column: &str, value: &str) -> Result<Option<Bot>> {
    let sql = format!("SELECT {BOT_COLUMNS} FROM bots WHERE {column} = ?1");
    Ok(conn.query_row(&sql, [value], bot_from_row).optional()?)
}

fn bot_from_row(row: &Row<'_>) -> rusqlite::Result<Bot> {
    Ok(Bot {
        id: row.get(0)?,
        community_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        is_active: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}

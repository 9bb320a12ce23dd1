use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use hub_types::models::CustomEmoji;

use crate::{Database, fmt_ts, new_id, ts_at};

const EMOJI_COLUMNS: &str = "id, community_id, name, url, created_by, created_at";

impl Database {
    /// `None` when the name is already taken in the community.
    pub fn add_custom_emoji(
        &self,
        community_id: &str,
        name: &str,
        url: &str,
        created_by: &str,
    ) -> Result<Option<CustomEmoji>> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO custom_emojis (id, community_id, name, url, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, community_id, name, url, created_by, now],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {EMOJI_COLUMNS} FROM custom_emojis WHERE id = ?1");
            Ok(conn.query_row(&sql, [&id], emoji_from_row).optional()?)
        })
    }

    pub fn list_custom_emojis(&self, community_id: &str) -> Result<Vec<CustomEmoji>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {EMOJI_COLUMNS} FROM custom_emojis WHERE community_id = ?1 ORDER BY name ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], emoji_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

fn emoji_from_row(row: &Row<'_>) -> rusqlite::Result<CustomEmoji> {
    Ok(CustomEmoji {
        id: row.get(0)?,
        community_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        created_by: row.get(4)?,
        created_at: ts_at(row, 5)?,
    })
}

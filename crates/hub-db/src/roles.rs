use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{Permission, Role};

use crate::{Database, json_at, new_id};

const ROLE_COLUMNS: &str = "id, community_id, name, color, permissions, position";

impl Database {
    pub fn create_role(
        &self,
        community_id: &str,
        name: &str,
        color: Option<&str>,
        permissions: &[Permission],
    ) -> Result<Role> {
        let id = new_id();
        let perms = serde_json::to_string(permissions)?;
        self.with_tx(|tx| {
            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM roles WHERE community_id = ?1",
                [community_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO roles (id, community_id, name, color, permissions, position)
                 VALUES (?1, ?2, ?3, COALESCE(?4, '#7c3aed'), ?5, ?6)",
                params![id, community_id, name, color, perms, position],
            )?;
            query_role(tx, community_id, name)?
                .ok_or_else(|| anyhow::anyhow!("role {name} vanished after insert"))
        })
    }

    pub fn get_role_by_name(&self, community_id: &str, name: &str) -> Result<Option<Role>> {
        self.with_conn(|conn| query_role(conn, community_id, name))
    }

    pub fn list_roles(&self, community_id: &str) -> Result<Vec<Role>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ROLE_COLUMNS} FROM roles WHERE community_id = ?1 ORDER BY position ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], role_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}

fn query_role(conn: &Connection, community_id: &str, name: &str) -> Result<Option<Role>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE community_id = ?1 AND name = ?2");
    Ok(conn
        .query_row(&sql, [community_id, name], role_from_row)
        .optional()?)
}

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        community_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        permissions: json_at(row, 4)?,
        position: row.get(5)?,
    })
}

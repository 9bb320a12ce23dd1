use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{Channel, ChannelKind, Community, MEMBER_ROLE, Member, OWNER_ROLE};

use crate::{Database, fmt_ts, new_id, opt_ts_at, parsed_at, ts_at};

const COMMUNITY_COLUMNS: &str =
    "id, name, description, owner_id, is_public, member_count, created_at";
const CHANNEL_COLUMNS: &str = "id, community_id, name, description, kind, position, is_locked";
const MEMBER_COLUMNS: &str =
    "community_id, user_id, username, role, is_online, last_seen_at, joined_at";

impl Database {
    /// Creates the community with its `general` and `announcements` channels
    /// and the owner as its first member.
    pub fn create_community(
        &self,
        owner_id: &str,
        owner_name: &str,
        name: &str,
        description: Option<&str>,
        is_public: bool,
    ) -> Result<Community> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO communities (id, name, description, owner_id, is_public, member_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![id, name, description, owner_id, is_public, now],
            )?;

            let defaults = [
                ("general", ChannelKind::Chat, 0, false),
                ("announcements", ChannelKind::Announcement, 1, true),
            ];
            for (channel_name, kind, position, locked) in defaults {
                tx.execute(
                    "INSERT INTO channels (id, community_id, name, kind, position, is_locked, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![new_id(), id, channel_name, kind.as_str(), position, locked, now],
                )?;
            }

            tx.execute(
                "INSERT INTO members (community_id, user_id, username, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner_id, owner_name, OWNER_ROLE, now],
            )?;

            query_community(tx, &id)?.ok_or_else(|| anyhow::anyhow!("community vanished"))
        })
    }

    pub fn get_community(&self, id: &str) -> Result<Option<Community>> {
        self.with_conn(|conn| query_community(conn, id))
    }

    pub fn list_public_communities(&self) -> Result<Vec<Community>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities
                 WHERE is_public = 1
                 ORDER BY member_count DESC, created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], community_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn list_user_communities(&self, user_id: &str) -> Result<Vec<Community>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description, c.owner_id, c.is_public, c.member_count, c.created_at
                 FROM communities c
                 JOIN members m ON m.community_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY m.joined_at ASC",
            )?;
            let rows = stmt.query_map([user_id], community_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // -- Channels --

    /// Appends a channel after the community's last one.
    pub fn create_channel(
        &self,
        community_id: &str,
        name: &str,
        kind: ChannelKind,
    ) -> Result<Channel> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        self.with_tx(|tx| {
            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM channels WHERE community_id = ?1",
                [community_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO channels (id, community_id, name, kind, position, is_locked, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![id, community_id, name, kind.as_str(), position, now],
            )?;
            query_channel(tx, &id)?.ok_or_else(|| anyhow::anyhow!("channel vanished"))
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<Channel>> {
        self.with_conn(|conn| query_channel(conn, id))
    }

    pub fn list_channels(&self, community_id: &str) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE community_id = ?1
                 ORDER BY position ASC, created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], channel_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // -- Members --

    pub fn get_member(&self, community_id: &str, user_id: &str) -> Result<Option<Member>> {
        self.with_conn(|conn| query_member(conn, community_id, user_id))
    }

    /// Adds a member with the default role. Returns `false` when the user was
    /// already a member, in which case nothing changes.
    pub fn add_member(&self, community_id: &str, user_id: &str, username: &str) -> Result<bool> {
        self.with_tx(|tx| add_member_tx(tx, community_id, user_id, username))
    }

    /// Returns `false` when the user was not a member.
    pub fn remove_member(&self, community_id: &str, user_id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM members WHERE community_id = ?1 AND user_id = ?2",
                (community_id, user_id),
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE communities SET member_count = MAX(member_count - 1, 0) WHERE id = ?1",
                    [community_id],
                )?;
            }
            Ok(removed > 0)
        })
    }

    pub fn list_members(&self, community_id: &str) -> Result<Vec<Member>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS} FROM members
                 WHERE community_id = ?1
                 ORDER BY is_online DESC, username ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], member_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Returns `false` when no such member exists.
    pub fn set_member_online(&self, community_id: &str, user_id: &str, online: bool) -> Result<bool> {
        let now = fmt_ts(&Utc::now());
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE members SET is_online = ?1, last_seen_at = ?2
                 WHERE community_id = ?3 AND user_id = ?4",
                params![online, now, community_id, user_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Changes a non-owner member's role. The owner row is never touched.
    pub fn set_member_role(&self, community_id: &str, user_id: &str, role: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE members SET role = ?1
                 WHERE community_id = ?2 AND user_id = ?3 AND role != ?4",
                params![role, community_id, user_id, OWNER_ROLE],
            )?;
            Ok(updated > 0)
        })
    }
}

pub(crate) fn add_member_tx(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
    username: &str,
) -> Result<bool> {
    let now = fmt_ts(&Utc::now());
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO members (community_id, user_id, username, role, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![community_id, user_id, username, MEMBER_ROLE, now],
    )?;
    if inserted > 0 {
        conn.execute(
            "UPDATE communities SET member_count = member_count + 1 WHERE id = ?1",
            [community_id],
        )?;
    }
    Ok(inserted > 0)
}

fn query_community(conn: &Connection, id: &str) -> Result<Option<Community>> {
    let sql = format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], community_from_row).optional()?)
}

pub(crate) fn query_channel(conn: &Connection, id: &str) -> Result<Option<Channel>> {
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], channel_from_row).optional()?)
}

pub(crate) fn query_member(
    conn: &Connection,
    community_id: &str,
    user_id: &str,
) -> Result<Option<Member>> {
    let sql =
        format!("SELECT {MEMBER_COLUMNS} FROM members WHERE community_id = ?1 AND user_id = ?2");
    Ok(conn
        .query_row(&sql, [community_id, user_id], member_from_row)
        .optional()?)
}

fn community_from_row(row: &Row<'_>) -> rusqlite::Result<Community> {
    Ok(Community {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        is_public: row.get(4)?,
        member_count: row.get(5)?,
        created_at: ts_at(row, 6)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        community_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        kind: parsed_at(row, 4)?,
        position: row.get(5)?,
        is_locked: row.get(6)?,
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        community_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        role: row.get(3)?,
        is_online: row.get(4)?,
        last_seen_at: opt_ts_at(row, 5)?,
        joined_at: ts_at(row, 6)?,
    })
}

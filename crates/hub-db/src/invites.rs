use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::Invite;

use crate::communities::add_member_tx;
use crate::models::RedeemOutcome;
use crate::{Database, fmt_ts, new_id, opt_ts_at, ts_at};

const INVITE_COLUMNS: &str =
    "id, community_id, code, created_by, max_uses, uses, expires_at, created_at";

impl Database {
    pub fn create_invite(
        &self,
        community_id: &str,
        code: &str,
        created_by: &str,
        max_uses: Option<i64>,
        expires_at: Option<&DateTime<Utc>>,
    ) -> Result<Invite> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        let expires_at = expires_at.map(fmt_ts);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invites (id, community_id, code, created_by, max_uses, uses, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![id, community_id, code, created_by, max_uses, expires_at, now],
            )?;
            query_invite(conn, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("invite {id} vanished after insert"))
        })
    }

    pub fn get_invite(&self, id: &str) -> Result<Option<Invite>> {
        self.with_conn(|conn| query_invite(conn, "id", id))
    }

    pub fn get_invite_by_code(&self, code: &str) -> Result<Option<Invite>> {
        self.with_conn(|conn| query_invite(conn, "code", code))
    }

    pub fn list_invites(&self, community_id: &str) -> Result<Vec<Invite>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {INVITE_COLUMNS} FROM invites WHERE community_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([community_id], invite_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Checks the code and joins the user in one transaction. Uses are only
    /// counted for users who were not already members.
    pub fn redeem_invite(
        &self,
        code: &str,
        user_id: &str,
        username: &str,
        now: &DateTime<Utc>,
    ) -> Result<RedeemOutcome> {
        self.with_tx(|tx| {
            let Some(invite) = query_invite(tx, "code", code)? else {
                return Ok(RedeemOutcome::Unknown);
            };
            if invite.expires_at.is_some_and(|at| at <= *now) {
                return Ok(RedeemOutcome::Expired);
            }
            if invite.max_uses.is_some_and(|max| invite.uses >= max) {
                return Ok(RedeemOutcome::Exhausted);
            }

            let joined = add_member_tx(tx, &invite.community_id, user_id, username)?;
            if joined {
                tx.execute("UPDATE invites SET uses = uses + 1 WHERE id = ?1", [&invite.id])?;
            }
            Ok(RedeemOutcome::Redeemed {
                community_id: invite.community_id,
                joined,
            })
        })
    }

    pub fn delete_invite(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM invites WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }
}

/// `column` is one of the fixed lookup columns above, never caller input.
fn query_invite(conn: &Connection, column: &str, value: &str) -> Result<Option<Invite>> {
    let sql = format!("SELECT {INVITE_COLUMNS} FROM invites WHERE {column} = ?1");
    Ok(conn.query_row(&sql, [value], invite_from_row).optional()?)
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<Invite> {
    Ok(Invite {
        id: row.get(0)?,
        community_id: row.get(1)?,
        code: row.get(2)?,
        created_by: row.get(3)?,
        max_uses: row.get(4)?,
        uses: row.get(5)?,
        expires_at: opt_ts_at(row, 6)?,
        created_at: ts_at(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn redeem_counts_new_members_only() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_community("u1", "alice", "c", None, false).unwrap();
        db.create_invite(&c.id, "AbCd1234", "u1", Some(1), None).unwrap();
        let now = Utc::now();

        // the owner is already a member, so this does not use the invite up
        let owner = db.redeem_invite("AbCd1234", "u1", "alice", &now).unwrap();
        assert_eq!(
            owner,
            RedeemOutcome::Redeemed {
                community_id: c.id.clone(),
                joined: false
            }
        );

        let bob = db.redeem_invite("AbCd1234", "u2", "bob", &now).unwrap();
        assert!(matches!(bob, RedeemOutcome::Redeemed { joined: true, .. }));
        assert_eq!(db.redeem_invite("AbCd1234", "u3", "carol", &now).unwrap(), RedeemOutcome::Exhausted);
        assert_eq!(db.get_community(&c.id).unwrap().unwrap().member_count, 2);
    }

    #[test]
    fn expired_and_unknown_codes_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let c = db.create_community("u1", "alice", "c", None, false).unwrap();
        let past = Utc::now() - Duration::minutes(5);
        let invite = db.create_invite(&c.id, "Old00000", "u1", None, Some(&past)).unwrap();

        let now = Utc::now();
        assert_eq!(db.redeem_invite("Old00000", "u2", "bob", &now).unwrap(), RedeemOutcome::Expired);
        assert_eq!(db.redeem_invite("Nope0000", "u2", "bob", &now).unwrap(), RedeemOutcome::Unknown);

        assert!(db.delete_invite(&invite.id).unwrap());
        assert!(db.get_invite_by_code("Old00000").unwrap().is_none());
    }
}

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use hub_types::models::{OptionTally, Poll, PollResults};

use crate::models::NewPoll;
use crate::{Database, fmt_ts, json_at, new_id, opt_ts_at, ts_at};

const POLL_COLUMNS: &str =
    "id, channel_id, creator_id, question, options, allow_multiple, ends_at, created_at";

impl Database {
    pub fn create_poll(&self, poll: &NewPoll) -> Result<Poll> {
        let id = new_id();
        let now = fmt_ts(&Utc::now());
        let options = serde_json::to_string(&poll.options)?;
        let ends_at = poll.ends_at.as_ref().map(fmt_ts);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO polls (id, channel_id, creator_id, question, options, allow_multiple, ends_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    poll.channel_id,
                    poll.creator_id,
                    poll.question,
                    options,
                    poll.allow_multiple,
                    ends_at,
                    now
                ],
            )?;
            query_poll(conn, &id)?.ok_or_else(|| anyhow::anyhow!("poll {id} vanished after insert"))
        })
    }

    pub fn get_poll(&self, id: &str) -> Result<Option<Poll>> {
        self.with_conn(|conn| query_poll(conn, id))
    }

    /// Newest first.
    pub fn list_polls(&self, channel_id: &str) -> Result<Vec<Poll>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POLL_COLUMNS} FROM polls WHERE channel_id = ?1 ORDER BY created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([channel_id], poll_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Records a vote. With `replace`, the user's earlier votes on the poll are
    /// dropped first so exactly one remains. Repeating a vote is a no-op.
    pub fn cast_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option_index: usize,
        replace: bool,
    ) -> Result<()> {
        let now = fmt_ts(&Utc::now());
        let option_index = i64::try_from(option_index)?;
        self.with_tx(|tx| {
            if replace {
                tx.execute(
                    "DELETE FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
                    (poll_id, user_id),
                )?;
            }
            tx.execute(
                "INSERT OR IGNORE INTO poll_votes (poll_id, user_id, option_index, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![poll_id, user_id, option_index, now],
            )?;
            Ok(())
        })
    }

    /// Per-option counts including options nobody picked.
    pub fn poll_results(&self, poll_id: &str) -> Result<Option<PollResults>> {
        self.with_conn(|conn| {
            let Some(poll) = query_poll(conn, poll_id)? else {
                return Ok(None);
            };

            let mut votes: Vec<OptionTally> = (0..poll.options.len())
                .map(|option_index| OptionTally {
                    option_index,
                    count: 0,
                })
                .collect();

            let mut stmt = conn.prepare(
                "SELECT option_index, COUNT(*) FROM poll_votes
                 WHERE poll_id = ?1
                 GROUP BY option_index",
            )?;
            let rows = stmt.query_map([poll_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (index, count) = row?;
                if let Some(tally) = usize::try_from(index).ok().and_then(|i| votes.get_mut(i)) {
                    tally.count = usize::try_from(count)?;
                }
            }

            let total_votes = votes.iter().map(|t| t.count).sum();
            Ok(Some(PollResults {
                poll,
                votes,
                total_votes,
            }))
        })
    }

    pub fn count_user_votes(&self, poll_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM poll_votes WHERE poll_id = ?1 AND user_id = ?2",
                (poll_id, user_id),
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n)?)
        })
    }
}

fn query_poll(conn: &Connection, id: &str) -> Result<Option<Poll>> {
    let sql = format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], poll_from_row).optional()?)
}

fn poll_from_row(row: &Row<'_>) -> rusqlite::Result<Poll> {
    Ok(Poll {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        creator_id: row.get(2)?,
        question: row.get(3)?,
        options: json_at(row, 4)?,
        allow_multiple: row.get(5)?,
        ends_at: opt_ts_at(row, 6)?,
        created_at: ts_at(row, 7)?,
    })
}

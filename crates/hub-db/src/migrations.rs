use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS communities (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            description     TEXT,
            owner_id        TEXT NOT NULL,
            is_public       INTEGER NOT NULL DEFAULT 1,
            member_count    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            description     TEXT,
            kind            TEXT NOT NULL DEFAULT 'chat',
            position        INTEGER NOT NULL DEFAULT 0,
            is_locked       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_channels_community
            ON channels(community_id, position);

        CREATE TABLE IF NOT EXISTS members (
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            username        TEXT NOT NULL,
            role            TEXT NOT NULL DEFAULT 'member',
            is_online       INTEGER NOT NULL DEFAULT 0,
            last_seen_at    TEXT,
            joined_at       TEXT NOT NULL,
            PRIMARY KEY (community_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON members(user_id);

        CREATE TABLE IF NOT EXISTS roles (
            id              TEXT PRIMARY KEY,
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            color           TEXT NOT NULL DEFAULT '#7c3aed',
            permissions     TEXT NOT NULL DEFAULT '[]',
            position        INTEGER NOT NULL DEFAULT 0,
            UNIQUE(community_id, name)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            channel_id          TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id             TEXT NOT NULL,
            username            TEXT NOT NULL,
            content             TEXT NOT NULL DEFAULT '',
            reply_to_id         TEXT REFERENCES messages(id) ON DELETE SET NULL,
            thread_parent_id    TEXT REFERENCES messages(id) ON DELETE CASCADE,
            forwarded_from_id   TEXT REFERENCES messages(id) ON DELETE SET NULL,
            is_bot              INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            edited_at           TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_parent_id, created_at);

        CREATE TABLE IF NOT EXISTS attachments (
            message_id  TEXT PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
            url         TEXT NOT NULL,
            kind        TEXT NOT NULL,
            filename    TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            username    TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS pinned_messages (
            message_id  TEXT PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
            channel_id  TEXT NOT NULL,
            pinned_by   TEXT NOT NULL,
            pinned_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS message_threads (
            parent_message_id   TEXT PRIMARY KEY REFERENCES messages(id) ON DELETE CASCADE,
            reply_count         INTEGER NOT NULL DEFAULT 0,
            last_reply_at       TEXT
        );

        CREATE TABLE IF NOT EXISTS polls (
            id              TEXT PRIMARY KEY,
            channel_id      TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            creator_id      TEXT NOT NULL,
            question        TEXT NOT NULL,
            options         TEXT NOT NULL,
            allow_multiple  INTEGER NOT NULL DEFAULT 0,
            ends_at         TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id         TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            option_index    INTEGER NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(poll_id, user_id, option_index)
        );

        CREATE TABLE IF NOT EXISTS dm_conversations (
            id              TEXT PRIMARY KEY,
            participant_a   TEXT NOT NULL,
            participant_b   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            last_message_at TEXT,
            CHECK (participant_a < participant_b),
            UNIQUE(participant_a, participant_b)
        );

        CREATE TABLE IF NOT EXISTS direct_messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES dm_conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_direct_messages_conversation
            ON direct_messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS scheduled_messages (
            id              TEXT PRIMARY KEY,
            channel_id      TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            username        TEXT NOT NULL,
            content         TEXT NOT NULL,
            scheduled_for   TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'sent', 'cancelled')),
            sent_message_id TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scheduled_due
            ON scheduled_messages(status, scheduled_for);

        CREATE TABLE IF NOT EXISTS custom_emojis (
            id              TEXT PRIMARY KEY,
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            url             TEXT NOT NULL,
            created_by      TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(community_id, name)
        );

        CREATE TABLE IF NOT EXISTS bots (
            id              TEXT PRIMARY KEY,
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            description     TEXT,
            api_key_hash    TEXT NOT NULL UNIQUE,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invites (
            id              TEXT PRIMARY KEY,
            community_id    TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            code            TEXT NOT NULL UNIQUE,
            created_by      TEXT NOT NULL,
            max_uses        INTEGER,
            uses            INTEGER NOT NULL DEFAULT 0,
            expires_at      TEXT,
            created_at      TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

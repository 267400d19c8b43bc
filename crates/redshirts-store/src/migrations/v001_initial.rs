//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table and the `lobby_sequences` table that hands
//! out per-lobby message numbers.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,   -- client-generated UUID
    send_time TEXT NOT NULL,               -- RFC-3339, UTC, fixed width
    lobby_id  TEXT NOT NULL,
    player_id TEXT NOT NULL,               -- author
    number    INTEGER NOT NULL,            -- per-lobby delivery cursor
    topic     TEXT NOT NULL,
    message   TEXT NOT NULL,               -- JSON document

    UNIQUE (lobby_id, number)
);

CREATE INDEX IF NOT EXISTS idx_messages_send_time
    ON messages(send_time);

CREATE INDEX IF NOT EXISTS idx_messages_lobby_player_topic
    ON messages(lobby_id, player_id, topic, number);

-- ----------------------------------------------------------------
-- Lobby sequences
-- ----------------------------------------------------------------
-- Survives purges so that numbers are never handed out twice.
CREATE TABLE IF NOT EXISTS lobby_sequences (
    lobby_id    TEXT PRIMARY KEY NOT NULL,
    last_number INTEGER NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}

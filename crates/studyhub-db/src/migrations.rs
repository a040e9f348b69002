use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create the tables the hub reads and writes.
///
/// The full application schema (users, groups, quizzes...) belongs to the
/// web application; only the two tables below are owned here.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS study_group_members (
            group_id     INTEGER NOT NULL,
            user_id      TEXT    NOT NULL,
            is_approved  INTEGER NOT NULL DEFAULT 0,
            is_deleted   INTEGER NOT NULL DEFAULT 0,
            joined_at    TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS direct_messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id    TEXT    NOT NULL,
            receiver_id  TEXT    NOT NULL,
            content      TEXT    NOT NULL CHECK (length(content) <= 1000),
            sent_at      TEXT    NOT NULL,
            is_read      INTEGER NOT NULL DEFAULT 0,
            read_at      TEXT,
            is_deleted   INTEGER NOT NULL DEFAULT 0,
            deleted_at   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
            ON direct_messages(sender_id, receiver_id, sent_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

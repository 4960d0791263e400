use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // Timestamps are RFC 3339 with fixed nanosecond precision so that
        // string order matches time order.
        conn.execute_batch(
            "
            CREATE TABLE users (
                username    TEXT PRIMARY KEY,
                email       TEXT,
                password    TEXT NOT NULL,
                last_seen   TEXT NOT NULL,
                is_online   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender          TEXT NOT NULL,
                receiver        TEXT NOT NULL,
                text            TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'sent'
                                CHECK (status IN ('sent', 'delivered', 'seen')),
                delivered_at    TEXT,
                seen_at         TEXT,
                is_deleted      INTEGER NOT NULL DEFAULT 0,
                deleted_at      TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender, receiver, status);

            CREATE INDEX idx_messages_receiver
                ON messages(receiver, created_at);

            CREATE TABLE deleted_messages (
                id                  TEXT PRIMARY KEY,
                original_message_id TEXT NOT NULL,
                sender              TEXT NOT NULL,
                receiver            TEXT NOT NULL,
                text                TEXT NOT NULL,
                sent_at             TEXT NOT NULL,
                deleted_at          TEXT NOT NULL
            );

            CREATE INDEX idx_deleted_original
                ON deleted_messages(original_message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

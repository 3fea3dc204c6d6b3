use rusqlite::Connection;

use crate::error::Result;

/// Create the messages table and its three indexes (§3). Safe to call on
/// every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            org_id          TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            sender_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            is_deleted      INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_messages_org_conversation_created
            ON messages(org_id, conversation_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_org_sender
            ON messages(org_id, sender_id);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
            ON messages(conversation_id, created_at DESC);",
    )?;
    Ok(())
}

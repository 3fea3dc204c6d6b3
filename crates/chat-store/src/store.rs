use std::sync::Mutex;

use chat_core::types::Message;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::instrument;

use crate::error::{Result, StoreError};

/// Thread-safe persistence adapter over a single SQLite connection. A
/// connection pool (e.g. r2d2) would be the natural next step under real
/// concurrency; a `Mutex` is sufficient for the single-node deployment this
/// backend targets.
pub struct MessageStore {
    conn: Mutex<Connection>,
}

impl MessageStore {
    /// Wrap an already-open (and [`crate::db::init_db`]-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[instrument(skip(self, message), fields(id = %message.id))]
    pub fn insert(&self, message: &Message) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages
             (id, org_id, conversation_id, sender_id, content, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id,
                message.org_id,
                message.conversation_id,
                message.sender_id,
                message.content,
                message.created_at,
                message.updated_at,
                message.is_deleted as i64,
            ],
        )?;
        Ok(())
    }

    /// Partial update of the mutable fields only (`content`, `updated_at`,
    /// `is_deleted`) — `org_id`/`conversation_id`/`sender_id` are immutable
    /// after insertion (§3) and are never part of this statement.
    #[instrument(skip(self, message), fields(id = %message.id))]
    pub fn save(&self, message: &Message) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE messages SET content=?2, updated_at=?3, is_deleted=?4 WHERE id=?1",
            params![
                message.id,
                message.content,
                message.updated_at,
                message.is_deleted as i64,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(message.id.clone()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get(&self, message_id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, org_id, conversation_id, sender_id, content, created_at, updated_at, is_deleted
             FROM messages WHERE id = ?1",
            params![message_id],
            row_to_message,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Single round-trip page + total count against the compound
    /// `(org_id, conversation_id, created_at DESC)` index — the relational
    /// analogue of a `$facet` aggregation (§4.5): a window-function `COUNT(*)
    /// OVER()` rides alongside every row of the page.
    #[instrument(skip(self))]
    pub fn paginate(
        &self,
        org_id: &str,
        conversation_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Message>, u64)> {
        let conn = self.conn.lock().unwrap();
        let offset = (page.saturating_sub(1)) as i64 * page_size as i64;

        let mut stmt = conn.prepare(
            "SELECT id, org_id, conversation_id, sender_id, content, created_at, updated_at,
                    is_deleted, COUNT(*) OVER() AS total
             FROM messages
             WHERE org_id = ?1 AND conversation_id = ?2 AND is_deleted = 0
             ORDER BY created_at DESC
             LIMIT ?3 OFFSET ?4",
        )?;

        let mut total: u64 = 0;
        let messages = stmt
            .query_map(params![org_id, conversation_id, page_size as i64, offset], |row| {
                total = row.get::<_, i64>(8)? as u64;
                row_to_message(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((messages, total))
    }

    /// Operator-reporting helper; never used in a request path.
    pub fn distinct_conversation_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT conversation_id FROM messages")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        org_id: row.get(1)?,
        conversation_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        is_deleted: row.get::<_, i64>(7)? != 0,
    })
}

use async_trait::async_trait;
use relay_core::ChatMessage;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Async seam over the chat log. Sessions append through it; the history
/// endpoint reads through it.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Persist one message and return the id the store assigned.
    async fn append(&self, message: &ChatMessage) -> Result<i64, StoreError>;

    /// The newest `limit` messages, oldest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;
}

#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, message), fields(sender = %message.sender))]
    pub fn insert(&self, message: &ChatMessage) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender, content, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    message.sender,
                    message.content,
                    row_helpers::format_timestamp(&message.timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest-first query, reversed into chronological order.
    #[instrument(skip(self))]
    pub fn latest(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut messages = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, content, timestamp FROM messages
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let raw_ts: String = row_helpers::get(row, 3, "messages", "timestamp")?;
                out.push(ChatMessage {
                    id: Some(row_helpers::get(row, 0, "messages", "id")?),
                    sender: row_helpers::get(row, 1, "messages", "sender")?,
                    content: row_helpers::get(row, 2, "messages", "content")?,
                    timestamp: row_helpers::parse_timestamp(&raw_ts, "messages", "timestamp")?,
                });
            }
            Ok(out)
        })?;
        messages.reverse();
        Ok(messages)
    }

    #[cfg(test)]
    fn count(&self) -> Result<i64, StoreError> {
        self.db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?))
    }
}

#[async_trait]
impl MessageStore for MessageRepo {
    async fn append(&self, message: &ChatMessage) -> Result<i64, StoreError> {
        let repo = self.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || repo.insert(&message)).await?
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || repo.latest(limit)).await?
    }
}

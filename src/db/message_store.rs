//! Conversation message persistence.
//!
//! The engine reads history and appends exactly one message per completed
//! interaction; it never updates or deletes stored turns. Each operation
//! acquires its connection from the pool for its own scope, so sessions
//! are released on every exit path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};

/// One persisted conversation turn.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: String,
    pub content: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message, returning its stored id.
    async fn append_message(
        &self,
        conversation_id: i64,
        role: &str,
        content: &serde_json::Value,
    ) -> Result<i64>;

    /// The `limit` most recent turns of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: i64, limit: i64)
        -> Result<Vec<ConversationTurn>>;
}

/// Postgres-backed store. Content is serialized JSON text.
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append_message(
        &self,
        conversation_id: i64,
        role: &str,
        content: &serde_json::Value,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING id",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EngineError::Persistence(format!("failed to save message: {}", e)))?;

        row.try_get::<i64, _>("id")
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>> {
        // Most recent turns, re-ordered chronologically.
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM ( \
                 SELECT role, content, created_at FROM messages \
                 WHERE conversation_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 \
             ) recent ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Persistence(format!("failed to load messages: {}", e)))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row
                .try_get("role")
                .map_err(|e| EngineError::Persistence(e.to_string()))?;
            let raw: String = row
                .try_get("content")
                .map_err(|e| EngineError::Persistence(e.to_string()))?;
            let created_at: Option<DateTime<Utc>> = row.try_get("created_at").ok();

            // Legacy rows may hold plain text instead of JSON.
            let content = serde_json::from_str(&raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw));
            turns.push(ConversationTurn {
                role,
                content,
                created_at,
            });
        }
        Ok(turns)
    }
}

/// In-memory store for tests and database-less CLI runs.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    next_id: i64,
    messages: HashMap<i64, Vec<(i64, ConversationTurn)>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append_message(
        &self,
        conversation_id: i64,
        role: &str,
        content: &serde_json::Value,
    ) -> Result<i64> {
        let mut state = self.inner.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.messages.entry(conversation_id).or_default().push((
            id,
            ConversationTurn {
                role: role.to_string(),
                content: content.clone(),
                created_at: Some(Utc::now()),
            },
        ));
        Ok(id)
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
    ) -> Result<Vec<ConversationTurn>> {
        let state = self.inner.lock().await;
        let turns = state
            .messages
            .get(&conversation_id)
            .map(|entries| {
                let skip = entries.len().saturating_sub(limit.max(0) as usize);
                entries
                    .iter()
                    .skip(skip)
                    .map(|(_, turn)| turn.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(turns)
    }
}

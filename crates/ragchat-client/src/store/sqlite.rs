//! SQLite implementation of [`ConversationStore`].
//!
//! Migrations under `./migrations` are embedded at compile time and applied
//! by [`SqliteStore::connect`]. Queries use the runtime-checked
//! `sqlx::query` form so no `DATABASE_URL` is needed to build.
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision, which
//! sorts lexically in chronological order.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use ragchat_types::Role;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;
use uuid::Uuid;

use super::{Conversation, ConversationPatch, ConversationStore, Message};
use crate::error::ClientError;

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

type ConversationRow = (String, String, String, String, String);
type MessageRow = (String, String, String, String, String);

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        warn!(raw = %raw, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

fn parse_id(raw: &str) -> Option<Uuid> {
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(raw = %raw, error = %e, "skipping row with malformed id");
            None
        }
    }
}

fn conversation_from_row((id, title, model, created_at, updated_at): ConversationRow) -> Option<Conversation> {
    Some(Conversation {
        id: parse_id(&id)?,
        title,
        model,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn message_from_row((id, conversation_id, role, content, created_at): MessageRow) -> Option<Message> {
    let role = match Role::from_str(&role) {
        Ok(role) => role,
        Err(e) => {
            warn!(message_id = %id, error = %e, "skipping message with unknown role");
            return None;
        }
    };
    Some(Message {
        id: parse_id(&id)?,
        conversation_id: parse_id(&conversation_id)?,
        role,
        content,
        created_at: parse_timestamp(&created_at),
    })
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL such as `sqlite://ragchat.db` or
    /// `sqlite::memory:`. In-memory databases live on a single pooled
    /// connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO conversations (id, title, model, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(conversation.id.to_string())
        .bind(&conversation.title)
        .bind(&conversation.model)
        .bind(timestamp(&conversation.created_at))
        .bind(timestamp(&conversation.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, sqlx::Error> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, title, model, created_at, updated_at \
             FROM conversations WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.and_then(conversation_from_row))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, sqlx::Error> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, title, model, created_at, updated_at \
             FROM conversations ORDER BY updated_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(conversation_from_row).collect())
    }

    async fn update_conversation(&self, id: Uuid, patch: ConversationPatch) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conversations \
             SET title = COALESCE(?1, title), model = COALESCE(?2, model), updated_at = ?3 \
             WHERE id = ?4",
        )
        .bind(patch.title)
        .bind(patch.model)
        .bind(timestamp(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: &Message) -> Result<(), sqlx::Error> {
        let conversation_id = message.conversation_id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(message.id.to_string())
        .bind(&conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(timestamp(&message.created_at))
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(timestamp(&Utc::now()))
            .bind(&conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at \
             FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(message_from_row).collect())
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

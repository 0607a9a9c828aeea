//! Conversation persistence.
//!
//! [`ConversationStore`] is the seam between a chat session and the database.
//! [`sqlite::SqliteStore`] is the only implementation; tests use it against
//! `sqlite::memory:`.
//!
//! All trait methods use `impl Future` in their signatures, so no
//! `async-trait` boxing is needed.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};
use ragchat_types::{ChatMessage, DEFAULT_MODEL, Role};
use uuid::Uuid;

pub use sqlite::SqliteStore;

/// Title given to conversations created without one.
pub const DEFAULT_TITLE: &str = "New conversation";

/// A row in the `conversations` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    /// Model id sent with every message in this conversation.
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on rename, model change and every appended message.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: Option<&str>, model: Option<&str>) -> Self {
        let now = Utc::now();
        let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TITLE);
        Self {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            model: model.unwrap_or(DEFAULT_MODEL).to_owned(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A row in the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Wire form sent to the proxy.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Partial update applied by [`ConversationStore::update_conversation`].
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub title: Option<String>,
    pub model: Option<String>,
}

pub trait ConversationStore: Send + Sync + 'static {
    fn create_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_conversation(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Conversation>, sqlx::Error>> + Send;

    /// Most recently updated first.
    fn list_conversations(&self)
    -> impl Future<Output = Result<Vec<Conversation>, sqlx::Error>> + Send;

    /// Returns `false` when no conversation has that id.
    fn update_conversation(
        &self,
        id: Uuid,
        patch: ConversationPatch,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Deletes the conversation together with its messages.
    fn delete_conversation(&self, id: Uuid)
    -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Inserts a message and touches the owning conversation's `updated_at`.
    fn append_message(
        &self,
        message: &Message,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Oldest first.
    fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Message>, sqlx::Error>> + Send;

    fn delete_message(&self, id: Uuid) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

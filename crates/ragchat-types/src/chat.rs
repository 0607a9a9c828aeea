//! Chat request types shared by the proxy and the client.
//!
//! Field names on the wire are camelCase (`conversationId`, `sessionId`) to
//! stay compatible with browser clients that already speak this contract.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session key forwarded upstream when the request carries no conversation id.
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown message role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// A single `{role, content}` entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation history, oldest first. The newest `user` entry is the query.
    pub messages: Vec<ChatMessage>,
    /// Model identifier selected by the user.
    #[serde(default)]
    pub model: String,
    /// Opaque session key used by the upstream to group turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// The most recent message authored by the user, if any.
    pub fn latest_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// Session key for the upstream; blank ids count as missing.
    pub fn session_key(&self) -> &str {
        match self.conversation_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => ANONYMOUS_SESSION,
        }
    }
}

/// Payload posted to the upstream RAG webhook.
///
/// The upstream is a single-turn query endpoint: only the latest user turn and
/// the session key are forwarded, never the full transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamQuery {
    pub query: String,
    pub session_id: String,
}

//! Wire types shared between `ragchat-proxy` and `ragchat-client`.

pub mod chat;
pub mod models;
pub mod sse;

pub use chat::{ANONYMOUS_SESSION, ChatMessage, ChatRequest, Role, UnknownRole, UpstreamQuery};
pub use models::{AVAILABLE_MODELS, DEFAULT_MODEL, ModelInfo};
pub use sse::{DeltaChunk, DONE_SENTINEL, EVENT_STREAM_CONTENT_TYPE};

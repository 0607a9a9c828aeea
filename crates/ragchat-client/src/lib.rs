//! Client side of ragchat: talks to `ragchat-proxy`, decodes its SSE stream
//! into incremental assistant content and keeps conversations in SQLite.

pub mod error;
pub mod proxy;
pub mod session;
pub mod sse;
pub mod store;

pub use error::ClientError;
pub use proxy::ProxyClient;
pub use session::{ChatSession, SessionView};
pub use sse::{ParserLimits, SseDecoder};
pub use store::{Conversation, ConversationPatch, ConversationStore, Message, SqliteStore};

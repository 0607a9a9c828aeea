use thiserror::Error;

/// Errors surfaced to callers of [`crate::ChatSession`] and the store.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Message text was empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// The proxy answered with a non-success status.
    #[error("{message}")]
    ChatRequestFailed { status: u16, message: String },

    /// The proxy could not be reached, or the response body broke off.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A frame never became valid JSON within the parser limits.
    #[error("malformed stream frame: {0}")]
    MalformedFrame(String),

    /// Referenced conversation does not exist.
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// Persistence failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS with preflight short-circuit, per-request trace id)
//! - Health / heartbeat route
//! - The `/chat` streaming proxy route
//! - JSON fallbacks for unknown paths and wrong methods

mod chat;
mod health;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{Router, middleware};

use crate::error::ProxyError;
use crate::middleware::{cors, trace};
use crate::state::AppState;

pub use chat::{client_key, parse_request};

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let app = Router::new()
        .merge(health::router())
        .merge(chat::router())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes));

    // Outermost layers execute first on the way in.
    cors::apply(app, &state.config.cors_allow_origin)
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

async fn not_found() -> ProxyError {
    ProxyError::NotFound
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

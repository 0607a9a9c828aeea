//! `GET /health`: liveness plus whether an upstream is wired up.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    /// `false` means `/chat` will answer 503 until `RAGCHAT_UPSTREAM_URL` is set.
    pub upstream_configured: bool,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        upstream_configured: state.config.upstream_url.is_some(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn state(upstream_url: Option<&str>) -> State<Arc<AppState>> {
        let config = Config {
            upstream_url: upstream_url.map(str::to_owned),
            ..Config::default()
        };
        State(Arc::new(AppState::from_config(config)))
    }

    #[tokio::test]
    async fn reports_ok_and_version() {
        let Json(body) = health(state(None)).await;
        assert_eq!(body.status, "ok");
        assert!(!body.version.is_empty());
        assert!(!body.upstream_configured);
    }

    #[tokio::test]
    async fn reports_configured_upstream() {
        let Json(body) = health(state(Some("http://rag.internal/hook"))).await;
        assert!(body.upstream_configured);
    }
}

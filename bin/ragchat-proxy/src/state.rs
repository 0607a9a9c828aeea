//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::limiter::{FixedWindowLimiter, RateLimiter};
use crate::normalize::{ContentExtractor, Normalizer};
use crate::upstream::UpstreamClient;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Proxy configuration (env-derived).
    pub config: Arc<Config>,
    /// Per-client request gate; the only state shared between requests.
    pub limiter: Arc<dyn RateLimiter>,
    /// Client for the RAG webhook.
    pub upstream: UpstreamClient,
    /// Upstream reply → SSE converter.
    pub normalizer: Normalizer,
}

impl AppState {
    /// Wire up the default in-memory limiter and the upstream client from `config`.
    pub fn from_config(config: Config) -> Self {
        let limiter = FixedWindowLimiter::new(config.rate_limit, config.rate_window, config.rate_max_keys);
        Self::with_limiter(config, Arc::new(limiter))
    }

    /// Same as [`AppState::from_config`] but with a caller-supplied limiter.
    pub fn with_limiter(config: Config, limiter: Arc<dyn RateLimiter>) -> Self {
        let upstream = UpstreamClient::new(config.upstream_url.clone(), config.upstream_timeout);
        let normalizer = Normalizer::new(ContentExtractor::new(config.content_fields.clone()));
        Self {
            config: Arc::new(config),
            limiter,
            upstream,
            normalizer,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("upstream", &self.upstream)
            .field("normalizer", &self.normalizer)
            .finish_non_exhaustive()
    }
}

//! Outbound call to the RAG webhook.
//!
//! [`UpstreamClient::forward`] narrows a [`ChatRequest`] to the single-turn
//! `{query, sessionId}` contract, posts it, and classifies the reply as either
//! a live event stream or a fully buffered body.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use ragchat_types::{ChatRequest, EVENT_STREAM_CONTENT_TYPE, UpstreamQuery};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info};

use crate::error::ProxyError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// What the upstream sent back.
pub enum UpstreamReply {
    /// `text/event-stream` body, relayed as it arrives.
    EventStream(ByteStream),
    /// Any other content type, read to the end as text.
    Buffered(String),
}

impl std::fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamReply::EventStream(_) => f.write_str("EventStream(..)"),
            UpstreamReply::Buffered(body) => f.debug_tuple("Buffered").field(&body.len()).finish(),
        }
    }
}

/// Map an inbound chat request onto the upstream payload.
pub fn build_query(req: &ChatRequest) -> Result<UpstreamQuery, ProxyError> {
    if req.messages.is_empty() {
        return Err(ProxyError::InvalidRequest("Messages array is required".into()));
    }
    let user = req
        .latest_user_message()
        .ok_or_else(|| ProxyError::InvalidRequest("no user message found".into()))?;

    Ok(UpstreamQuery {
        query: user.content.clone(),
        session_id: req.session_key().to_owned(),
    })
}

/// HTTP client bound to one upstream webhook.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    url: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .user_agent(concat!("ragchat-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, url, timeout }
    }

    /// Build the upstream payload from `req` and send it.
    ///
    /// The timeout covers everything up to the response headers and, for
    /// buffered replies, reading the body. When it fires the in-flight request
    /// future is dropped, which aborts the call and frees its connection.
    pub async fn forward(&self, req: &ChatRequest) -> Result<UpstreamReply, ProxyError> {
        let query = build_query(req)?;
        let url = self.url.as_deref().ok_or_else(|| {
            error!("upstream URL is not configured (set RAGCHAT_UPSTREAM_URL)");
            ProxyError::NotConfigured
        })?;

        let deadline = Instant::now() + self.timeout;
        debug!(session_id = %query.session_id, query_len = query.query.len(), "forwarding to upstream");

        let response = timeout_at(deadline, self.client.post(url).json(&query).send())
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.timeout))?
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "upstream returned an error status");
            return Err(ProxyError::UpstreamError { status: status.as_u16() });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();

        if content_type.contains(EVENT_STREAM_CONTENT_TYPE) {
            info!("upstream replied with an event stream; relaying");
            return Ok(UpstreamReply::EventStream(response.bytes_stream().boxed()));
        }

        let body = timeout_at(deadline, response.text())
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.timeout))?
            .map_err(|e| self.classify(e))?;
        info!(content_type = %content_type, body_len = body.len(), "upstream replied with a buffered body");
        Ok(UpstreamReply::Buffered(body))
    }

    fn classify(&self, e: reqwest::Error) -> ProxyError {
        if e.is_timeout() {
            ProxyError::UpstreamTimeout(self.timeout)
        } else {
            ProxyError::UpstreamUnavailable(e)
        }
    }
}

//! HTTP client for the proxy's `POST /chat` endpoint.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use ragchat_types::ChatRequest;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Raw body of a successful chat response, chunked as it arrives.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[derive(Clone, Debug)]
pub struct ProxyClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ProxyClient {
    /// `endpoint` is the full URL of the chat route, e.g.
    /// `http://localhost:3000/chat`.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(Client::new(), endpoint, api_key)
    }

    pub fn with_client(http: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Send `request` and hand back the response body as a chunk stream.
    ///
    /// A non-success status is turned into [`ClientError::ChatRequestFailed`]
    /// using the `error` field of the JSON body when there is one.
    pub async fn open_stream(&self, request: &ChatRequest) -> Result<ChunkStream, ClientError> {
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat request rejected by proxy");
            return Err(ClientError::ChatRequestFailed {
                status: status.as_u16(),
                message: error_message(status.as_u16(), &text),
            });
        }

        debug!(status = status.as_u16(), "chat stream opened");
        Ok(Box::pin(resp.bytes_stream().map_err(ClientError::from)))
    }
}

fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("failed to get a response from the assistant (status {status})"))
}

//! Reshape upstream replies into the canonical SSE stream.
//!
//! Clients only ever parse one frame shape. A live upstream event stream is
//! relayed byte-for-byte; JSON envelopes and bare text are collapsed into a
//! single content frame followed by `data: [DONE]`.

use axum::body::Body;
use futures::TryStreamExt;
use ragchat_types::sse;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::upstream::UpstreamReply;

/// Pulls reply text out of a JSON body by probing fields in priority order.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    fields: Vec<String>,
}

impl ContentExtractor {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Reply text for a raw upstream body.
    ///
    /// JSON-looking bodies are searched for the first present, non-null field;
    /// a top-level array is searched through its first element. Anything else,
    /// including JSON without a known field, is returned verbatim.
    pub fn extract(&self, body: &str) -> String {
        let trimmed = body.trim();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return body.to_owned();
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "upstream body looked like JSON but did not parse; using raw text");
                return body.to_owned();
            }
        };

        let object = match &value {
            Value::Array(items) => items.first(),
            other => Some(other),
        };

        object
            .and_then(|obj| self.first_field(obj))
            .unwrap_or_else(|| {
                warn!(fields = ?self.fields, "no content field in upstream JSON; using raw text");
                body.to_owned()
            })
    }

    fn first_field(&self, obj: &Value) -> Option<String> {
        self.fields.iter().find_map(|name| match obj.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        })
    }
}

/// Turns any [`UpstreamReply`] into SSE bytes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    extractor: ContentExtractor,
}

impl Normalizer {
    pub fn new(extractor: ContentExtractor) -> Self {
        Self { extractor }
    }

    pub fn normalize(&self, reply: UpstreamReply) -> Result<Body, ProxyError> {
        match reply {
            UpstreamReply::EventStream(stream) => Ok(Body::from_stream(stream.inspect_err(|e| {
                warn!(error = %e, "upstream event stream broke off mid-relay");
            }))),
            UpstreamReply::Buffered(text) => Ok(Body::from(self.normalize_text(&text)?)),
        }
    }

    /// Encode a buffered upstream body as one content frame plus `[DONE]`.
    pub fn normalize_text(&self, body: &str) -> Result<String, ProxyError> {
        if body.trim().is_empty() {
            return Err(ProxyError::UpstreamEmptyResponse);
        }
        let content = self.extractor.extract(body);
        if content.trim().is_empty() {
            return Err(ProxyError::UpstreamEmptyResponse);
        }
        sse::single_reply(&content).map_err(|e| ProxyError::Internal(format!("encoding SSE frame: {e}")))
    }
}

//! Canonical SSE framing shared by the proxy (writer) and the client (reader).
//!
//! A frame is `data: <payload>\n\n`. Content frames carry an OpenAI-style
//! delta chunk; the stream ends with a `data: [DONE]` frame.

use serde::{Deserialize, Serialize};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";
pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// `{"choices":[{"delta":{"content":...}}]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChunk {
    #[serde(default)]
    pub choices: Vec<DeltaChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DeltaChunk {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            choices: vec![DeltaChoice { delta: Delta { content: Some(text.into()) } }],
        }
    }

    /// `choices[0].delta.content`, if present.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

/// Wrap an already-encoded payload in a single SSE frame.
pub fn data_frame(payload: &str) -> String {
    format!("{DATA_PREFIX}{payload}\n\n")
}

/// The terminating `data: [DONE]` frame.
pub fn done_frame() -> String {
    data_frame(DONE_SENTINEL)
}

/// Encode one content frame followed by the terminator.
pub fn single_reply(content: &str) -> Result<String, serde_json::Error> {
    let chunk = serde_json::to_string(&DeltaChunk::content(content))?;
    let mut out = data_frame(&chunk);
    out.push_str(&done_frame());
    Ok(out)
}

/// Pull `choices[0].delta.content` out of an arbitrary JSON frame payload.
///
/// Frames relayed from an upstream stream may carry extra fields or shapes we
/// don't model, so this reads the raw value instead of a typed chunk.
pub fn delta_content(frame: &serde_json::Value) -> Option<&str> {
    frame
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

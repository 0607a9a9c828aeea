//! Incremental decoder for the proxy's SSE stream.
//!
//! Bytes arrive in arbitrary chunks: a frame, or even a UTF-8 code point, may
//! be split across reads. [`SseDecoder`] buffers text, extracts complete lines
//! and yields the non-empty `choices[0].delta.content` strings in order.
//!
//! A complete `data:` line whose payload is not valid JSON is pushed back onto
//! the buffer and decoding pauses until more bytes arrive. That pause is
//! bounded by [`ParserLimits`] so a persistently malformed upstream fails loudly
//! instead of stalling the conversation forever.

use ragchat_types::sse::{DATA_PREFIX, DONE_SENTINEL, delta_content};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Bounds on how long the decoder waits for a frame to become parseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserLimits {
    /// Longest unterminated line kept in the buffer.
    pub max_line_bytes: usize,
    /// Feeds a pushed-back line may survive before it is declared malformed.
    pub max_retries: u32,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 1024 * 1024,
            max_retries: 16,
        }
    }
}

enum Line {
    Skip,
    Done,
    Frame(Value),
    Incomplete,
}

fn classify(line: &str) -> Line {
    if line.starts_with(':') || line.trim().is_empty() {
        return Line::Skip;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Line::Done;
    }
    match serde_json::from_str(payload) {
        Ok(value) => Line::Frame(value),
        Err(_) => Line::Incomplete,
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    /// Trailing bytes of a code point split across chunks.
    utf8_tail: Vec<u8>,
    limits: ParserLimits,
    /// Consecutive feeds the head-of-buffer line has failed to parse.
    stalled: u32,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_limits(ParserLimits::default())
    }

    pub fn with_limits(limits: ParserLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Whether a `data: [DONE]` frame has been seen.
    pub fn saw_done(&self) -> bool {
        self.done
    }

    /// Append a network chunk and return the content deltas it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, ClientError> {
        let mut deltas = Vec::new();
        self.feed_into(chunk, &mut deltas)?;
        Ok(deltas)
    }

    /// Like [`SseDecoder::feed`], but deltas decoded before a failure are
    /// still pushed to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) -> Result<(), ClientError> {
        self.decode(chunk);
        self.drain_lines(out)?;

        if self.stalled == 0 && self.buffer.len() > self.limits.max_line_bytes {
            return Err(ClientError::MalformedFrame(format!(
                "unterminated line exceeds {} bytes",
                self.limits.max_line_bytes
            )));
        }
        Ok(())
    }

    /// Flush whatever is left once the stream has ended.
    ///
    /// A final line without a trailing newline is still decoded; one that
    /// never became valid JSON is dropped with a warning.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }

        let rest = std::mem::take(&mut self.buffer);
        let mut deltas = Vec::new();
        for line in rest.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            match classify(line) {
                Line::Skip => {}
                Line::Done => self.done = true,
                Line::Frame(value) => push_delta(&value, &mut deltas),
                Line::Incomplete => {
                    warn!(line_len = line.len(), "stream ended inside an incomplete frame; dropping it");
                }
            }
        }
        self.stalled = 0;
        deltas
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    self.buffer.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            self.utf8_tail = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self, deltas: &mut Vec<String>) -> Result<(), ClientError> {
        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }

            match classify(&line) {
                Line::Skip => {}
                Line::Done => {
                    debug!("received [DONE]");
                    self.done = true;
                }
                Line::Frame(value) => {
                    self.stalled = 0;
                    push_delta(&value, deltas);
                }
                Line::Incomplete => {
                    self.stalled += 1;
                    if self.stalled > self.limits.max_retries {
                        return Err(ClientError::MalformedFrame(preview(&line)));
                    }
                    line.push('\n');
                    self.buffer.insert_str(0, &line);
                    debug!(attempt = self.stalled, "frame not parseable yet; waiting for more bytes");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn push_delta(value: &Value, deltas: &mut Vec<String>) {
    if let Some(content) = delta_content(value).filter(|c| !c.is_empty()) {
        deltas.push(content.to_owned());
    }
}

fn preview(line: &str) -> String {
    const MAX: usize = 80;
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_owned(),
    }
}

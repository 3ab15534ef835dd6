//! Server-sent events from the Messages API.
//!
//! The upstream streams `event:`/`data:` line pairs. Only `data:` lines carry
//! information; each holds one JSON [`ApiEvent`]. Text arrives in
//! `content_block_delta` events.

use crate::error::{ColloquyError, Result};
use crate::upstream::FragmentSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiEvent {
    MessageStart {
        #[serde(default)]
        message: MessageInfo,
    },
    ContentBlockStart {
        #[serde(default)]
        index: u32,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: u32,
        delta: Delta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaInfo,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MessageInfo {
    pub id: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MessageDeltaInfo {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// What the demultiplexer cares about from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    TextDelta(String),
    End,
    Error(String),
}

impl ApiEvent {
    /// Maps an API event onto the upstream contract. Bookkeeping events
    /// yield `None`.
    pub fn into_upstream(self) -> Option<UpstreamEvent> {
        match self {
            ApiEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => Some(UpstreamEvent::TextDelta(text)),
            ApiEvent::ContentBlockDelta {
                delta: Delta::Other,
                ..
            } => None,
            ApiEvent::MessageStop => Some(UpstreamEvent::End),
            ApiEvent::Error { error } => Some(UpstreamEvent::Error(format!(
                "{}: {}",
                error.kind, error.message
            ))),
            ApiEvent::MessageStart { message } => {
                tracing::debug!(id = %message.id, model = %message.model, "Upstream message started");
                None
            }
            ApiEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.stop_reason {
                    tracing::debug!(stop_reason = %reason, "Upstream message stopping");
                }
                None
            }
            ApiEvent::ContentBlockStart { .. }
            | ApiEvent::ContentBlockStop { .. }
            | ApiEvent::Ping
            | ApiEvent::Unknown => None,
        }
    }
}

/// Push decoder for an SSE byte stream.
///
/// Bytes may be split anywhere, including inside a line or a multi-byte
/// character; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    ended: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `message_stop` or `[DONE]` has been seen.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Feeds raw bytes and returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<UpstreamEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        let line = std::mem::take(&mut self.buf);
        self.line(&line).into_iter().collect()
    }

    fn line(&mut self, raw: &[u8]) -> Option<UpstreamEvent> {
        if self.ended {
            return None;
        }
        let line = String::from_utf8_lossy(raw);
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload.is_empty() {
            return None;
        }
        if payload == "[DONE]" {
            self.ended = true;
            return Some(UpstreamEvent::End);
        }

        match serde_json::from_str::<ApiEvent>(payload) {
            Ok(event) => {
                let event = event.into_upstream()?;
                if event == UpstreamEvent::End {
                    self.ended = true;
                }
                Some(event)
            }
            Err(e) => {
                tracing::warn!(error = %e, line = %payload, "Skipping malformed SSE data line");
                None
            }
        }
    }
}

/// Decoded events waiting to be handed out as fragments.
#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<UpstreamEvent>,
    closed: bool,
}

impl EventQueue {
    pub(crate) fn extend(&mut self, events: Vec<UpstreamEvent>) {
        self.events.extend(events);
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    /// The next fragment-source result, or `None` if more input is needed.
    pub(crate) fn next(&mut self) -> Option<Result<Option<String>>> {
        while let Some(event) = self.events.pop_front() {
            match event {
                UpstreamEvent::TextDelta(text) if text.is_empty() => continue,
                UpstreamEvent::TextDelta(text) => return Some(Ok(Some(text))),
                UpstreamEvent::End => {
                    self.events.clear();
                    self.closed = true;
                    return Some(Ok(None));
                }
                UpstreamEvent::Error(message) => {
                    self.events.clear();
                    self.closed = true;
                    return Some(Err(ColloquyError::Upstream { message }));
                }
            }
        }
        // A stream that closes without `message_stop` still completes normally.
        self.closed.then_some(Ok(None))
    }
}

/// Adapts any buffered async reader carrying SSE to a [`FragmentSource`].
pub struct SseSource<R> {
    reader: R,
    decoder: SseDecoder,
    queue: EventQueue,
}

impl<R> SseSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: SseDecoder::new(),
            queue: EventQueue::default(),
        }
    }
}

#[async_trait]
impl<R> FragmentSource for SseSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(next) = self.queue.next() {
                return next;
            }
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                self.queue.extend(self.decoder.finish());
                self.queue.close();
                continue;
            }
            let len = buf.len();
            let events = self.decoder.push(buf);
            self.reader.consume(len);
            self.queue.extend(events);
        }
    }

    fn name(&self) -> &'static str {
        "sse"
    }
}

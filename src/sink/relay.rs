//! Wire relay: one JSON line per event, flushed immediately.

use crate::demux::StreamEvent;
use crate::error::Result;
use crate::ipc::protocol::WireEvent;
use crate::sink::EventSink;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Serializes events as [`WireEvent`] lines onto any async writer.
pub struct WireRelaySink<W> {
    writer: W,
    lines: u64,
}

impl<W> WireRelaySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Writes one wire event and flushes so the client sees it immediately.
    pub async fn send(&mut self, event: &WireEvent) -> Result<()> {
        let mut line = event.to_json()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        self.lines += 1;
        Ok(())
    }

    /// Number of lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> EventSink for WireRelaySink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn accept(&mut self, event: &StreamEvent) -> Result<()> {
        self.send(&WireEvent::from(event)).await
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::Segment;

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let mut sink = WireRelaySink::new(Vec::new());
        sink.accept(&StreamEvent::Segment(Segment {
            speaker_id: "moderator".to_string(),
            text: "Welcome\nto the debate".to_string(),
            sequence: 0,
            is_terminal: true,
        }))
        .await
        .unwrap();
        sink.accept(&StreamEvent::Done).await.unwrap();
        assert_eq!(sink.lines(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"type":"message","speakerId":"moderator","text":"Welcome\nto the debate","done":false}"#,
                r#"{"type":"done","done":true}"#,
            ]
        );
    }

    #[tokio::test]
    async fn error_event_is_relayed() {
        let mut sink = WireRelaySink::new(Vec::new());
        sink.accept(&StreamEvent::Error {
            message: "upstream closed".to_string(),
        })
        .await
        .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "{\"type\":\"error\",\"error\":\"upstream closed\"}\n");
    }

    #[tokio::test]
    async fn closed_writer_fails() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut sink = WireRelaySink::new(client);
        assert!(sink.accept(&StreamEvent::Done).await.is_err());
    }
}

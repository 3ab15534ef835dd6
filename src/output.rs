//! Terminal rendering of session events for `--pretty` output.

use crate::demux::StreamEvent;
use crate::error::Result;
use crate::ipc::protocol::WireEvent;
use crate::sink::EventSink;
use async_trait::async_trait;
use owo_colors::OwoColorize;
use std::io::Write;

const PALETTE_SIZE: usize = 6;

/// Stable colour slot for a speaker id.
fn color_slot(speaker: &str) -> usize {
    speaker
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
        % PALETTE_SIZE
}

fn paint_speaker(speaker: &str, color: bool) -> String {
    if !color {
        return speaker.to_string();
    }
    if speaker == crate::defaults::MODERATOR_ID {
        return speaker.bold().to_string();
    }
    match color_slot(speaker) {
        0 => speaker.cyan().bold().to_string(),
        1 => speaker.green().bold().to_string(),
        2 => speaker.yellow().bold().to_string(),
        3 => speaker.magenta().bold().to_string(),
        4 => speaker.blue().bold().to_string(),
        _ => speaker.red().bold().to_string(),
    }
}

/// Renders one wire event as human-readable text, or `None` for events that
/// have no visible form.
pub fn render_wire_event(event: &WireEvent, color: bool) -> Option<String> {
    match event {
        WireEvent::Session { session_id } => {
            let line = format!("session {session_id}");
            Some(if color { line.dimmed().to_string() } else { line })
        }
        WireEvent::Message {
            speaker_id, text, ..
        } => Some(format!("{}: {}\n", paint_speaker(speaker_id, color), text)),
        WireEvent::Done { .. } => None,
        WireEvent::Error { error } => {
            let line = format!("error: {error}");
            Some(if color { line.red().to_string() } else { line })
        }
    }
}

/// Sink that prints each event in readable form.
pub struct PrettySink<W> {
    out: W,
    color: bool,
}

impl<W: Write + Send> PrettySink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_event(&mut self, event: &WireEvent) -> Result<()> {
        if let Some(text) = render_wire_event(event, self.color) {
            writeln!(self.out, "{text}")?;
            self.out.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for PrettySink<W> {
    async fn accept(&mut self, event: &StreamEvent) -> Result<()> {
        self.write_event(&WireEvent::from(event))
    }

    fn name(&self) -> &'static str {
        "pretty"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::Segment;

    #[test]
    fn plain_message_rendering() {
        let event = WireEvent::Message {
            speaker_id: "MLKJr".to_string(),
            text: "Injustice anywhere is a threat to justice everywhere.".to_string(),
            done: false,
        };
        assert_eq!(
            render_wire_event(&event, false).as_deref(),
            Some("MLKJr: Injustice anywhere is a threat to justice everywhere.\n")
        );
    }

    #[test]
    fn done_is_silent_and_error_is_shown() {
        assert_eq!(render_wire_event(&WireEvent::done(), false), None);
        assert_eq!(
            render_wire_event(&WireEvent::error("boom"), false).as_deref(),
            Some("error: boom")
        );
    }

    #[test]
    fn colored_output_keeps_text() {
        let event = WireEvent::Message {
            speaker_id: "Augustine354".to_string(),
            text: "An unjust law is no law at all.".to_string(),
            done: false,
        };
        let rendered = render_wire_event(&event, true).unwrap();
        assert!(rendered.contains("Augustine354"));
        assert!(rendered.contains("\x1b["));
        assert!(rendered.ends_with("An unjust law is no law at all.\n"));
    }

    #[test]
    fn speaker_colors_are_stable() {
        assert_eq!(color_slot("MLKJr"), color_slot("MLKJr"));
        assert!(color_slot("anything") < PALETTE_SIZE);
    }

    #[tokio::test]
    async fn pretty_sink_writes_segments() {
        let mut sink = PrettySink::new(Vec::new(), false);
        sink.accept(&StreamEvent::Segment(Segment {
            speaker_id: "moderator".to_string(),
            text: "Welcome".to_string(),
            sequence: 0,
            is_terminal: false,
        }))
        .await
        .unwrap();
        sink.accept(&StreamEvent::Done).await.unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "moderator: Welcome\n\n");
    }
}

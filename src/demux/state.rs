//! Segment state machine.
//!
//! Owns the active speaker, the text accumulated for that speaker and the
//! pending buffer of text that cannot be attributed yet. Synchronous and
//! deterministic: the same text produces the same segments however it is
//! split into fragments.

use crate::demux::scanner::{self, Marker, Scan};
use crate::demux::types::{DemuxConfig, Segment, SpeakerPolicy};

/// Per-session demultiplexer state.
#[derive(Debug)]
pub struct Demuxer {
    config: DemuxConfig,
    /// `None` until the first marker is seen.
    speaker: Option<String>,
    /// Unattributed prose (no speaker yet) or an in-progress candidate marker.
    pending: String,
    /// Offset into `pending` up to which no marker can start.
    scanned: usize,
    /// Text accumulated for the active speaker.
    message: String,
    sequence: u64,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new(DemuxConfig::default())
    }
}

impl Demuxer {
    pub fn new(config: DemuxConfig) -> Self {
        Self {
            config,
            speaker: None,
            pending: String::new(),
            scanned: 0,
            message: String::new(),
            sequence: 0,
        }
    }

    /// The speaker currently accumulating text, if any.
    pub fn current_speaker(&self) -> Option<&str> {
        self.speaker.as_deref()
    }

    /// Text held back because it is not attributable yet.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Number of segments emitted so far.
    pub fn emitted(&self) -> u64 {
        self.sequence
    }

    /// Appends a fragment and returns every segment it completes, in order.
    pub fn push(&mut self, fragment: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        if fragment.is_empty() {
            return out;
        }
        self.pending.push_str(fragment);

        loop {
            match scanner::scan(&self.pending, self.scanned, self.config.max_speaker_id_len) {
                Scan::Marker(marker) => self.on_marker(marker, &mut out),
                Scan::Partial { open } => {
                    self.settle(open);
                    break;
                }
                Scan::Clear => {
                    self.settle(self.pending.len());
                    break;
                }
            }
        }

        out
    }

    /// Ends the session and returns the final segment, if there is one.
    ///
    /// A dangling candidate marker (e.g. a trailing `"[mod"`) is discarded,
    /// as is any prose seen before the first marker.
    pub fn finish(mut self) -> Option<Segment> {
        if !self.pending.is_empty() {
            if self.speaker.is_some() {
                tracing::debug!(
                    dangling = %self.pending,
                    "Discarding unterminated marker at end of stream"
                );
            } else {
                tracing::debug!(
                    bytes = self.pending.len(),
                    "Discarding text with no speaker at end of stream"
                );
            }
            self.pending.clear();
        }
        self.take_segment(true)
    }

    /// Moves `pending[..upto]` to the active speaker, or just records how far
    /// the buffer has been scanned when nobody is speaking yet.
    fn settle(&mut self, upto: usize) {
        if self.speaker.is_some() {
            self.message.push_str(&self.pending[..upto]);
            self.pending.drain(..upto);
            self.scanned = 0;
        } else {
            self.scanned = upto;
        }
    }

    fn on_marker(&mut self, marker: Marker, out: &mut Vec<Segment>) {
        if self.speaker.is_some() {
            self.message.push_str(&self.pending[..marker.open]);
        } else if marker.open > 0 {
            tracing::trace!(
                bytes = marker.open,
                "Dropping preamble before first speaker marker"
            );
        }

        let repeat = self.speaker.as_deref() == Some(marker.speaker_id.as_str());
        if !(repeat && self.config.same_speaker == SpeakerPolicy::Merge) {
            if let Some(segment) = self.take_segment(false) {
                out.push(segment);
            }
            tracing::trace!(speaker = %marker.speaker_id, "Speaker transition");
            self.speaker = Some(marker.speaker_id);
        }

        self.pending.drain(..marker.body);
        self.scanned = 0;
    }

    fn take_segment(&mut self, is_terminal: bool) -> Option<Segment> {
        let speaker = self.speaker.as_ref()?;
        let text = self.message.trim();
        if text.is_empty() {
            self.message.clear();
            return None;
        }

        let segment = Segment {
            speaker_id: speaker.clone(),
            text: text.to_string(),
            sequence: self.sequence,
            is_terminal,
        };
        self.sequence += 1;
        self.message.clear();
        Some(segment)
    }
}

/// Runs a whole fragment sequence through a fresh [`Demuxer`].
pub fn demux_all<'a, I>(config: DemuxConfig, fragments: I) -> Vec<Segment>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut demuxer = Demuxer::new(config);
    let mut segments = Vec::new();
    for fragment in fragments {
        segments.extend(demuxer.push(fragment));
    }
    segments.extend(demuxer.finish());
    segments
}

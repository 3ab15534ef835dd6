//! Data types produced by the demultiplexer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One fully attributed unit of message text for a single speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Speaker id parsed from the `[id]:` marker.
    pub speaker_id: String,
    /// Message text, trimmed of surrounding whitespace.
    pub text: String,
    /// Position in the session, starting at 0.
    pub sequence: u64,
    /// True for the segment produced by the end-of-stream flush.
    pub is_terminal: bool,
}

/// Events pushed to sinks, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A completed speaker segment.
    Segment(Segment),
    /// The upstream finished normally and every segment has been emitted.
    Done,
    /// The session ended abnormally (upstream failure or sink abort).
    Error { message: String },
}

impl StreamEvent {
    /// True for events after which nothing else is emitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    pub fn as_segment(&self) -> Option<&Segment> {
        match self {
            StreamEvent::Segment(segment) => Some(segment),
            _ => None,
        }
    }
}

/// How a marker naming the already-active speaker is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerPolicy {
    /// Every marker flushes the current segment, even for the same speaker.
    #[default]
    Split,
    /// A repeated marker for the active speaker continues the same segment.
    Merge,
}

impl fmt::Display for SpeakerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakerPolicy::Split => write!(f, "split"),
            SpeakerPolicy::Merge => write!(f, "merge"),
        }
    }
}

impl FromStr for SpeakerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(SpeakerPolicy::Split),
            "merge" => Ok(SpeakerPolicy::Merge),
            other => Err(format!(
                "unknown speaker policy '{other}' (expected split or merge)"
            )),
        }
    }
}

/// Tuning for one demultiplexer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    pub same_speaker: SpeakerPolicy,
    pub max_speaker_id_len: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            same_speaker: SpeakerPolicy::Split,
            max_speaker_id_len: crate::defaults::MAX_SPEAKER_ID_LEN,
        }
    }
}

impl DemuxConfig {
    pub fn with_policy(mut self, policy: SpeakerPolicy) -> Self {
        self.same_speaker = policy;
        self
    }
}

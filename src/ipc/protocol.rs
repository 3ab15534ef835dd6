//! Line-delimited JSON wire protocol between the session server and clients.
//!
//! The client sends one [`DebateRequest`](crate::request::DebateRequest) line;
//! the server answers with a `session` line followed by one [`WireEvent`] per
//! demultiplexer event.

use crate::demux::StreamEvent;
use serde::{Deserialize, Serialize};

/// Events written to the wire, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// First line of every served session.
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// A completed speaker segment.
    Message {
        #[serde(rename = "speakerId")]
        speaker_id: String,
        text: String,
        done: bool,
    },
    /// Normal end of the session.
    Done { done: bool },
    /// Abnormal end of the session.
    Error { error: String },
}

impl WireEvent {
    pub fn done() -> Self {
        WireEvent::Done { done: true }
    }

    pub fn error(message: impl Into<String>) -> Self {
        WireEvent::Error {
            error: message.into(),
        }
    }

    /// True for `done` and `error`, after which nothing else is sent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireEvent::Done { .. } | WireEvent::Error { .. })
    }

    /// Serialize event to a JSON string (without trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl From<&StreamEvent> for WireEvent {
    fn from(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Segment(segment) => WireEvent::Message {
                speaker_id: segment.speaker_id.clone(),
                text: segment.text.clone(),
                done: false,
            },
            StreamEvent::Done => WireEvent::done(),
            StreamEvent::Error { message } => WireEvent::error(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::Segment;

    #[test]
    fn message_json_shape() {
        let event = WireEvent::Message {
            speaker_id: "moderator".to_string(),
            text: "Welcome".to_string(),
            done: false,
        };
        assert_eq!(
            event.to_json().expect("should serialize"),
            r#"{"type":"message","speakerId":"moderator","text":"Welcome","done":false}"#
        );
    }

    #[test]
    fn done_and_error_json_shape() {
        assert_eq!(
            WireEvent::done().to_json().expect("should serialize"),
            r#"{"type":"done","done":true}"#
        );
        assert_eq!(
            WireEvent::error("boom").to_json().expect("should serialize"),
            r#"{"type":"error","error":"boom"}"#
        );
    }

    #[test]
    fn session_json_shape() {
        let event = WireEvent::Session {
            session_id: "abc".to_string(),
        };
        assert_eq!(
            event.to_json().expect("should serialize"),
            r#"{"type":"session","sessionId":"abc"}"#
        );
    }

    #[test]
    fn parses_lines_from_other_producers() {
        let event = WireEvent::from_json(
            r#"{"done":false,"text":"Thank you","speakerId":"Augustine354","type":"message"}"#,
        )
        .expect("should deserialize");
        assert_eq!(
            event,
            WireEvent::Message {
                speaker_id: "Augustine354".to_string(),
                text: "Thank you".to_string(),
                done: false,
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(WireEvent::from_json(r#"{"type":"chunk"}"#).is_err());
        assert!(WireEvent::from_json("not json").is_err());
    }

    #[test]
    fn converts_stream_events() {
        let segment = StreamEvent::Segment(Segment {
            speaker_id: "MLKJr".to_string(),
            text: "Injustice anywhere".to_string(),
            sequence: 4,
            is_terminal: true,
        });
        let wire = WireEvent::from(&segment);
        assert!(matches!(wire, WireEvent::Message { ref speaker_id, done: false, .. } if speaker_id == "MLKJr"));
        assert!(!wire.is_terminal());

        assert_eq!(WireEvent::from(&StreamEvent::Done), WireEvent::done());
        let err = WireEvent::from(&StreamEvent::Error {
            message: "reset".to_string(),
        });
        assert_eq!(err, WireEvent::error("reset"));
        assert!(err.is_terminal());
    }
}

//! Speaker-segmented stream demultiplexer.
//!
//! Turns a stream of text fragments containing inline `[speakerId]: text`
//! markers into an ordered sequence of per-speaker [`Segment`]s.

pub mod driver;
pub mod scanner;
pub mod state;
pub mod types;

pub use driver::{CancelHandle, CancelToken, Outcome, SessionReport, StreamDriver, cancel_pair};
pub use state::{Demuxer, demux_all};
pub use types::{DemuxConfig, Segment, SpeakerPolicy, StreamEvent};

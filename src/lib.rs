//! colloquy - Speaker demultiplexer for streamed multi-voice LLM output
//!
//! Splits `[speakerId]: text` markers out of an arbitrarily fragmented text
//! stream and delivers one ordered message per speaker turn.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod demux;
pub mod error;
pub mod ipc;
pub mod logging;
#[cfg(feature = "cli")]
pub mod output;
pub mod request;
pub mod sink;
pub mod upstream;

// Core traits (source -> demux -> sink)
pub use sink::{CollectorSink, EventSink, SharedSink, TranscriptSink, WireRelaySink};
pub use upstream::FragmentSource;

// Demultiplexer
pub use demux::{
    DemuxConfig, Demuxer, Segment, SpeakerPolicy, StreamDriver, StreamEvent, demux_all,
};

// Error handling
pub use error::{ColloquyError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.0.1+abc1234"` when git hash is available, `"0.0.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

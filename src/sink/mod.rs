//! Event sinks: consumers of demultiplexer events.

pub mod relay;
pub mod transcript;

pub use relay::WireRelaySink;
pub use transcript::{
    DirectoryStore, Transcript, TranscriptEntry, TranscriptMessage, TranscriptSink,
    TranscriptStatus, TranscriptStore, TranscriptSummary,
};

use crate::demux::{Segment, StreamEvent};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pluggable consumer of [`StreamEvent`]s.
///
/// `accept` is awaited for every event in order; a slow implementation slows
/// the whole session down. Returning an error aborts the session.
#[async_trait]
pub trait EventSink: Send {
    async fn accept(&mut self, event: &StreamEvent) -> Result<()>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Records every event. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct CollectorSink {
    events: Vec<StreamEvent>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.events.iter().filter_map(StreamEvent::as_segment)
    }

    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }
}

#[async_trait]
impl EventSink for CollectorSink {
    async fn accept(&mut self, event: &StreamEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// A sink shared between several sessions.
///
/// Each push holds the lock for the duration of one `accept`, so events from
/// different sessions interleave but never tear.
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> SharedSink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// The shared sink itself, for inspection once sessions are done.
    pub fn inner(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.inner)
    }
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<S: EventSink> EventSink for SharedSink<S> {
    async fn accept(&mut self, event: &StreamEvent) -> Result<()> {
        self.inner.lock().await.accept(event).await
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

//! Stream driver: pulls fragments, runs the state machine, pushes events.
//!
//! The driver is the only part of the demultiplexer that awaits anything. It
//! awaits the next fragment and each sink's `accept`, and nothing else: a slow
//! sink back-pressures the upstream read.

use crate::demux::state::Demuxer;
use crate::demux::types::{DemuxConfig, StreamEvent};
use crate::error::{ColloquyError, Result};
use crate::sink::EventSink;
use crate::upstream::FragmentSource;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Creates a connected cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Requests cancellation of every session holding a matching token.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another token observing this handle.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Upstream completed; the final flush and `Done` were delivered.
    Completed,
    /// Upstream failed; an `Error` event was delivered.
    UpstreamFailed(String),
    /// The caller cancelled; no terminal event was delivered.
    Cancelled,
}

/// Summary of one driver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub fragments: u64,
    pub segments: u64,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

/// Drives one session from a [`FragmentSource`] into a set of sinks.
#[derive(Debug, Clone, Default)]
pub struct StreamDriver {
    config: DemuxConfig,
}

impl StreamDriver {
    pub fn new(config: DemuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Runs a session to completion, failure or cancellation.
    ///
    /// Every event is delivered to every sink, in sink order, before the next
    /// fragment is read. A sink error aborts the session: the remaining sinks
    /// are told via an `Error` event and `ColloquyError::Sink` is returned.
    pub async fn run<S>(
        &self,
        source: &mut S,
        sinks: &mut [&mut dyn EventSink],
        mut cancel: CancelToken,
    ) -> Result<SessionReport>
    where
        S: FragmentSource + ?Sized,
    {
        let started = Instant::now();
        let mut demuxer = Demuxer::new(self.config.clone());
        let mut fragments = 0u64;

        tracing::info!(
            source = source.name(),
            sinks = sinks.len(),
            policy = %self.config.same_speaker,
            "Session started"
        );

        let report = |outcome: Outcome, fragments: u64, segments: u64| SessionReport {
            outcome,
            fragments,
            segments,
            elapsed: started.elapsed(),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(fragments, segments = demuxer.emitted(), "Session cancelled");
                    return Ok(report(Outcome::Cancelled, fragments, demuxer.emitted()));
                }
                next = source.next_fragment() => next,
            };

            match next {
                Ok(Some(fragment)) => {
                    fragments += 1;
                    tracing::trace!(fragment = %fragment, "Fragment received");
                    for segment in demuxer.push(&fragment) {
                        if cancel.is_cancelled() {
                            return Ok(report(Outcome::Cancelled, fragments, demuxer.emitted()));
                        }
                        tracing::debug!(
                            speaker = %segment.speaker_id,
                            sequence = segment.sequence,
                            chars = segment.text.chars().count(),
                            "Segment emitted"
                        );
                        deliver(sinks, &StreamEvent::Segment(segment)).await?;
                    }
                }
                Ok(None) => {
                    if cancel.is_cancelled() {
                        return Ok(report(Outcome::Cancelled, fragments, demuxer.emitted()));
                    }
                    let mut segments = demuxer.emitted();
                    if let Some(segment) = demuxer.finish() {
                        segments = segment.sequence + 1;
                        deliver(sinks, &StreamEvent::Segment(segment)).await?;
                        if cancel.is_cancelled() {
                            tracing::info!(fragments, segments, "Session cancelled at final flush");
                            return Ok(report(Outcome::Cancelled, fragments, segments));
                        }
                    }
                    deliver(sinks, &StreamEvent::Done).await?;
                    let done = report(Outcome::Completed, fragments, segments);
                    tracing::info!(
                        fragments = done.fragments,
                        segments = done.segments,
                        elapsed_ms = done.elapsed.as_millis() as u64,
                        "Session completed"
                    );
                    return Ok(done);
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(error = %message, "Upstream failed, ending session");
                    let segments = demuxer.emitted();
                    if cancel.is_cancelled() {
                        return Ok(report(Outcome::Cancelled, fragments, segments));
                    }
                    deliver(
                        sinks,
                        &StreamEvent::Error {
                            message: message.clone(),
                        },
                    )
                    .await?;
                    return Ok(report(Outcome::UpstreamFailed(message), fragments, segments));
                }
            }
        }
    }
}

/// Pushes one event to every sink in order, aborting on the first failure.
async fn deliver(sinks: &mut [&mut dyn EventSink], event: &StreamEvent) -> Result<()> {
    for index in 0..sinks.len() {
        if let Err(e) = sinks[index].accept(event).await {
            let sink = sinks[index].name().to_string();
            tracing::error!(sink = %sink, error = %e, "Sink failed, aborting session");
            abort_others(sinks, index, &sink, &e).await;
            return Err(ColloquyError::Sink {
                sink,
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

/// Best-effort notice to every sink except the one that failed.
async fn abort_others(
    sinks: &mut [&mut dyn EventSink],
    failed: usize,
    sink: &str,
    cause: &ColloquyError,
) {
    let notice = StreamEvent::Error {
        message: format!("session aborted: sink '{sink}' failed: {cause}"),
    };
    for (index, other) in sinks.iter_mut().enumerate() {
        if index == failed {
            continue;
        }
        if let Err(e) = other.accept(&notice).await {
            tracing::warn!(sink = other.name(), error = %e, "Abort notice not delivered");
        }
    }
}

//! Async Unix socket session server.
//!
//! Each connection is one debate session: the client sends a single
//! [`DebateRequest`] line and receives line-delimited [`WireEvent`]s until
//! `done` or `error`.

use crate::demux::{CancelHandle, CancelToken, DemuxConfig, Outcome, StreamDriver, cancel_pair};
use crate::error::{ColloquyError, Result};
use crate::ipc::protocol::WireEvent;
use crate::request::DebateRequest;
use crate::sink::{TranscriptSink, TranscriptStore, WireRelaySink};
use crate::upstream::FragmentSource;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::Instrument;

/// Message sent to clients when the upstream cannot be opened.
pub const GENERATION_FAILED: &str = "Failed to generate debate. Please try again.";

/// Opens an upstream fragment source for a validated request.
#[async_trait::async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, request: &DebateRequest) -> Result<Box<dyn FragmentSource>>;
}

/// What every session task needs, shared across connections.
#[derive(Clone)]
struct SessionContext {
    driver: StreamDriver,
    factory: Arc<dyn SourceFactory>,
    store: Option<Arc<dyn TranscriptStore>>,
}

/// Session server on a Unix socket.
pub struct SessionServer {
    socket_path: PathBuf,
    context: SessionContext,
    shutdown: CancelHandle,
}

impl SessionServer {
    /// Create a new server for the specified socket path.
    pub fn new(socket_path: PathBuf, factory: Arc<dyn SourceFactory>) -> Self {
        let (shutdown, _) = cancel_pair();
        Self {
            socket_path,
            context: SessionContext {
                driver: StreamDriver::default(),
                factory,
                store: None,
            },
            shutdown,
        }
    }

    /// Persist completed transcripts to `store`.
    pub fn with_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.context.store = Some(store);
        self
    }

    pub fn with_demux(mut self, config: DemuxConfig) -> Self {
        self.context.driver = StreamDriver::new(config);
        self
    }

    /// Get the socket path this server is using.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket and serve sessions until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ColloquyError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ColloquyError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        tracing::info!(socket = %self.socket_path.display(), "Session server listening");

        let mut shutdown = self.shutdown.token();
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    let context = self.context.clone();
                    let cancel = self.shutdown.token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_session(stream, context, cancel).await {
                            tracing::warn!(error = %e, "Session ended with error");
                        }
                    });
                }
                Err(e) => {
                    return Err(ColloquyError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
            }
        }

        tracing::info!("Session server stopped");
        Ok(())
    }

    /// Stop accepting, cancel in-flight sessions and remove the socket file.
    pub async fn stop(&self) -> Result<()> {
        self.shutdown.cancel();

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ColloquyError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Run one session over an accepted connection.
async fn handle_session(
    stream: UnixStream,
    context: SessionContext,
    cancel: CancelToken,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut relay = WireRelaySink::new(writer);

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .map_err(|e| ColloquyError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let request: DebateRequest = match serde_json::from_str(line.trim()) {
        Ok(request) => request,
        Err(e) => {
            let message = format!("Failed to parse request: {}", e);
            relay.send(&WireEvent::error(&message)).await?;
            return Err(ColloquyError::IpcProtocol { message });
        }
    };

    if let Err(e) = request.validate() {
        tracing::info!(error = %e, "Rejected invalid request");
        relay.send(&WireEvent::error(e.to_string())).await?;
        return Ok(());
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("session", id = %session_id);
    run_session(session_id, request, relay, context, cancel)
        .instrument(span)
        .await
}

async fn run_session<W>(
    session_id: String,
    request: DebateRequest,
    mut relay: WireRelaySink<W>,
    context: SessionContext,
    cancel: CancelToken,
) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    relay
        .send(&WireEvent::Session {
            session_id: session_id.clone(),
        })
        .await?;

    let started_at = Utc::now();
    let mut source = match context.factory.open(&request).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open upstream");
            relay.send(&WireEvent::error(GENERATION_FAILED)).await?;
            return Ok(());
        }
    };

    let mut transcript = TranscriptSink::new();
    let report = context
        .driver
        .run(&mut *source, &mut [&mut relay, &mut transcript], cancel)
        .await?;

    match (&report.outcome, context.store) {
        (Outcome::Completed, Some(store)) => {
            let document = transcript.to_transcript(&session_id, &request, started_at);
            // Persistence is off the request path; the client already has `done`.
            tokio::spawn(
                async move {
                    if let Err(e) = store.save(&document).await {
                        tracing::warn!(store = store.name(), error = %e, "Failed to save transcript");
                    }
                }
                .in_current_span(),
            );
        }
        (Outcome::UpstreamFailed(message), _) => {
            tracing::warn!(error = %message, "Session ended on upstream failure");
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::VecSource;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct ScriptedFactory {
        fragments: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl SourceFactory for ScriptedFactory {
        async fn open(&self, _request: &DebateRequest) -> Result<Box<dyn FragmentSource>> {
            Ok(Box::new(VecSource::new(self.fragments.clone())))
        }
    }

    struct BrokenFactory;

    #[async_trait::async_trait]
    impl SourceFactory for BrokenFactory {
        async fn open(&self, _request: &DebateRequest) -> Result<Box<dyn FragmentSource>> {
            Err(ColloquyError::UpstreamStatus {
                status: 529,
                body: "overloaded".to_string(),
            })
        }
    }

    const REQUEST: &str = r#"{"topic":"Is civil disobedience justified?","selectedPanelists":[{"id":"Augustine354","name":"Augustine"},{"id":"MLKJr","name":"Martin Luther King Jr."}]}"#;

    async fn start(factory: Arc<dyn SourceFactory>) -> (TempDir, PathBuf, Arc<SessionServer>) {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let server = Arc::new(SessionServer::new(socket_path.clone(), factory));
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.start().await });

        // Give server time to start
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        (temp_dir, socket_path, server)
    }

    async fn exchange(socket_path: &Path, request: &str) -> Vec<WireEvent> {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .unwrap();
        let mut data = String::new();
        stream.read_to_string(&mut data).await.unwrap();
        data.lines()
            .map(|line| WireEvent::from_json(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_server_binds_to_socket() {
        let factory = Arc::new(ScriptedFactory { fragments: vec![] });
        let (_dir, socket_path, server) = start(factory).await;
        assert!(socket_path.exists());
        assert_eq!(server.socket_path(), socket_path.as_path());
    }

    #[tokio::test]
    async fn test_session_streams_segments_then_done() {
        let factory = Arc::new(ScriptedFactory {
            fragments: vec!["[moderator]: Welcome\n[MLK", "Jr]: Thank you"],
        });
        let (_dir, socket_path, _server) = start(factory).await;

        let events = exchange(&socket_path, REQUEST).await;
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], WireEvent::Session { session_id } if session_id.len() == 36));
        assert_eq!(
            events[1],
            WireEvent::Message {
                speaker_id: "moderator".to_string(),
                text: "Welcome".to_string(),
                done: false,
            }
        );
        assert_eq!(
            events[2],
            WireEvent::Message {
                speaker_id: "MLKJr".to_string(),
                text: "Thank you".to_string(),
                done: false,
            }
        );
        assert_eq!(events[3], WireEvent::done());
    }

    #[tokio::test]
    async fn test_invalid_request_gets_single_error() {
        let factory = Arc::new(ScriptedFactory { fragments: vec![] });
        let (_dir, socket_path, _server) = start(factory).await;

        let events = exchange(
            &socket_path,
            r#"{"topic":"short","selectedPanelists":[]}"#,
        )
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WireEvent::Error { error } if error.contains("at least 10")));

        let events = exchange(&socket_path, "not valid json").await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_upstream_open_failure_sends_generic_error() {
        let (_dir, socket_path, _server) = start(Arc::new(BrokenFactory)).await;

        let events = exchange(&socket_path, REQUEST).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WireEvent::Session { .. }));
        assert_eq!(events[1], WireEvent::error(GENERATION_FAILED));
    }

    #[tokio::test]
    async fn test_stop_removes_socket() {
        let factory = Arc::new(ScriptedFactory { fragments: vec![] });
        let (_dir, socket_path, server) = start(factory).await;
        assert!(socket_path.exists());

        server.stop().await.unwrap();
        assert!(!socket_path.exists());
    }
}

//! IPC client for running sessions against a session server.

use crate::error::{ColloquyError, Result};
use crate::ipc::protocol::WireEvent;
use crate::request::DebateRequest;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

/// Events of one session, read line by line from the server.
pub struct EventStream {
    reader: BufReader<OwnedReadHalf>,
    // Held so the server never sees a half-closed connection mid-session.
    _writer: OwnedWriteHalf,
    session_id: Option<String>,
    finished: bool,
}

/// Connect to the server and submit a debate request.
///
/// # Errors
/// Returns `ColloquyError::IpcConnection` if the connection or write fails
/// Returns `ColloquyError::IpcProtocol` if the request cannot be serialized
pub async fn open_session(socket_path: &Path, request: &DebateRequest) -> Result<EventStream> {
    let stream =
        UnixStream::connect(socket_path)
            .await
            .map_err(|e| ColloquyError::IpcConnection {
                message: format!("Failed to connect to server: {}", e),
            })?;

    let (reader, mut writer) = stream.into_split();

    let mut request_json =
        serde_json::to_string(request).map_err(|e| ColloquyError::IpcProtocol {
            message: format!("Failed to serialize request: {}", e),
        })?;
    request_json.push('\n');

    writer
        .write_all(request_json.as_bytes())
        .await
        .map_err(|e| ColloquyError::IpcConnection {
            message: format!("Failed to write request: {}", e),
        })?;

    writer
        .flush()
        .await
        .map_err(|e| ColloquyError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(EventStream {
        reader: BufReader::new(reader),
        _writer: writer,
        session_id: None,
        finished: false,
    })
}

impl EventStream {
    /// Session id announced by the server, once its first line has been read.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Next event, or `None` after `done`/`error` or when the server hangs up.
    pub async fn next_event(&mut self) -> Result<Option<WireEvent>> {
        if self.finished {
            return Ok(None);
        }

        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| ColloquyError::IpcConnection {
                    message: format!("Failed to read event: {}", e),
                })?;
            if n == 0 {
                self.finished = true;
                return Ok(None);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        let event =
            WireEvent::from_json(line.trim()).map_err(|e| ColloquyError::IpcProtocol {
                message: format!("Failed to deserialize event: {}", e),
            })?;

        match &event {
            WireEvent::Session { session_id } => self.session_id = Some(session_id.clone()),
            e if e.is_terminal() => self.finished = true,
            _ => {}
        }

        Ok(Some(event))
    }

    /// Reads every remaining event.
    pub async fn collect(mut self) -> Result<Vec<WireEvent>> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await? {
            events.push(event);
        }
        Ok(events)
    }
}

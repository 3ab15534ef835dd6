//! Error types for colloquy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColloquyError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // Upstream errors
    #[error("Upstream connection failed: {message}")]
    UpstreamConnection { message: String },

    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Upstream protocol error: {message}")]
    UpstreamProtocol { message: String },

    #[error("Upstream stream failed: {message}")]
    Upstream { message: String },

    // Sink errors
    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ColloquyError {
    /// True for failures that originate upstream of the demultiplexer.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ColloquyError::UpstreamConnection { .. }
                | ColloquyError::UpstreamStatus { .. }
                | ColloquyError::UpstreamProtocol { .. }
                | ColloquyError::Upstream { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ColloquyError>;

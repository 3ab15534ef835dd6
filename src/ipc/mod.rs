//! Unix socket push transport for debate sessions.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{EventStream, open_session};
pub use protocol::WireEvent;
pub use server::{SessionServer, SourceFactory};

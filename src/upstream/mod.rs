//! Fragment sources: where the demultiplexer's text comes from.

#[cfg(feature = "http")]
pub mod anthropic;
pub mod source;
pub mod sse;

pub use source::{ChannelSource, ReaderSource, VecSource};
pub use sse::{ApiEvent, SseDecoder, SseSource, UpstreamEvent};

use crate::error::Result;
use async_trait::async_trait;

/// Async producer of text fragments.
///
/// `Ok(Some(_))` is the next fragment, `Ok(None)` normal completion and
/// `Err(_)` an upstream failure. Fragment boundaries carry no meaning.
#[async_trait]
pub trait FragmentSource: Send {
    async fn next_fragment(&mut self) -> Result<Option<String>>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "source"
    }
}

#[async_trait]
impl<S: FragmentSource + ?Sized> FragmentSource for Box<S> {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        (**self).next_fragment().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Removes and returns the longest valid UTF-8 prefix of `buf`.
///
/// An incomplete multi-byte sequence at the end stays in `buf` for the next
/// read; invalid bytes are replaced with U+FFFD.
pub(crate) fn drain_utf8(buf: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buf) {
            Ok(s) => {
                out.push_str(s);
                buf.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                match e.error_len() {
                    None => {
                        out.push_str(&String::from_utf8_lossy(&buf[..valid]));
                        buf.drain(..valid);
                        return out;
                    }
                    Some(bad) => {
                        out.push_str(&String::from_utf8_lossy(&buf[..valid + bad]));
                        buf.drain(..valid + bad);
                    }
                }
            }
        }
    }
}

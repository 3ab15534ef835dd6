//! In-process fragment sources.

use crate::defaults;
use crate::error::{ColloquyError, Result};
use crate::upstream::{FragmentSource, drain_utf8};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Replays a fixed list of fragments, optionally failing at the end.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    fragments: VecDeque<String>,
    failure: Option<String>,
}

impl VecSource {
    pub fn new<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: None,
        }
    }

    /// Ends with an upstream error instead of normal completion.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl FragmentSource for VecSource {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        if let Some(fragment) = self.fragments.pop_front() {
            return Ok(Some(fragment));
        }
        match self.failure.take() {
            Some(message) => Err(ColloquyError::Upstream { message }),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "vec"
    }
}

/// Fragments pushed through a tokio channel. Closing the sender completes
/// the stream.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<String>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Result<String>>) -> Self {
        Self { rx }
    }

    /// A bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<String>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl FragmentSource for ChannelSource {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        match self.rx.recv().await {
            Some(Ok(fragment)) => Ok(Some(fragment)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Raw text read in chunks from any async reader.
pub struct ReaderSource<R> {
    reader: R,
    chunk: Vec<u8>,
    carry: Vec<u8>,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, defaults::READ_CHUNK_BYTES)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0; chunk_size.max(1)],
            carry: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> FragmentSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.carry.is_empty() {
                    return Ok(None);
                }
                let rest = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                return Ok(Some(rest));
            }
            self.carry.extend_from_slice(&self.chunk[..n]);
            let text = drain_utf8(&mut self.carry);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    fn name(&self) -> &'static str {
        "reader"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain<S: FragmentSource>(source: &mut S) -> Result<Vec<String>> {
        let mut out = Vec::new();
        while let Some(fragment) = source.next_fragment().await? {
            out.push(fragment);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn vec_source_replays_then_completes() {
        let mut source = VecSource::new(["a", "b"]);
        assert_eq!(drain(&mut source).await.unwrap(), vec!["a", "b"]);
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn vec_source_fails_after_fragments() {
        let mut source = VecSource::new(["a"]).failing_with("reset");
        assert_eq!(source.next_fragment().await.unwrap(), Some("a".to_string()));
        let err = source.next_fragment().await.unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn channel_source_forwards_errors() {
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(Ok("one".to_string())).await.unwrap();
        tx.send(Err(ColloquyError::Upstream {
            message: "gone".to_string(),
        }))
        .await
        .unwrap();
        drop(tx);

        assert_eq!(source.next_fragment().await.unwrap(), Some("one".to_string()));
        assert!(source.next_fragment().await.is_err());
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reader_source_preserves_multibyte_chars() {
        let text = "[Søren]: «Ça va»\n[moderator]: ok";
        // A 3-byte chunk splits several multi-byte characters.
        let mut source = ReaderSource::with_chunk_size(text.as_bytes(), 3);
        let fragments = drain(&mut source).await.unwrap();
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), text);
    }

    #[tokio::test]
    async fn reader_source_empty_input() {
        let mut source = ReaderSource::new(&b""[..]);
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reader_source_flushes_truncated_tail_lossily() {
        let bytes = [b'h', b'i', 0xc3];
        let mut source = ReaderSource::with_chunk_size(&bytes[..], 8);
        let fragments = drain(&mut source).await.unwrap();
        assert_eq!(fragments.concat(), "hi\u{fffd}");
    }
}

//! Streaming Messages API client.

use crate::config::UpstreamConfig;
use crate::error::{ColloquyError, Result};
use crate::ipc::server::SourceFactory;
use crate::request::{DebateRequest, build_debate_prompt};
use crate::upstream::FragmentSource;
use crate::upstream::sse::{EventQueue, SseDecoder};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// Longest error body kept from a non-2xx response.
const MAX_ERROR_BODY: usize = 512;

/// Client for the upstream Messages endpoint.
#[derive(Clone)]
pub struct MessagesClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    api_key: String,
}

impl std::fmt::Debug for MessagesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagesClient")
            .field("config", &self.config)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl MessagesClient {
    pub fn new(config: UpstreamConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ColloquyError::ConfigInvalidValue {
                key: "upstream.api_key".to_string(),
                message: "API key is empty".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ColloquyError::UpstreamConnection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Reads the API key from the environment variable named in the config.
    pub fn from_env(config: UpstreamConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ColloquyError::ConfigInvalidValue {
                key: "upstream.api_key_env".to_string(),
                message: format!("environment variable {} is not set", config.api_key_env),
            }
        })?;
        Self::new(config, api_key)
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// JSON body of a streaming request for `prompt`.
    pub fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "stream": true,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        })
    }

    /// Starts a streaming generation and returns its text as a fragment source.
    pub async fn open(&self, prompt: &str) -> Result<HttpSource> {
        let body = serde_json::to_vec(&self.request_body(prompt))?;

        tracing::info!(
            url = %self.config.api_url,
            model = %self.config.model,
            max_tokens = self.config.max_tokens,
            "Opening upstream stream"
        );

        let response = self
            .http
            .post(&self.config.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.api_version)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| ColloquyError::UpstreamConnection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            tracing::warn!(status = status.as_u16(), body = %body, "Upstream rejected request");
            return Err(ColloquyError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        check_content_type(content_type)?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(HttpSource::new(stream))
    }
}

/// A successful response must be an event stream when it says what it is.
fn check_content_type(content_type: Option<&str>) -> Result<()> {
    match content_type {
        Some(ct) if !ct.trim_start().starts_with("text/event-stream") => {
            tracing::warn!(content_type = %ct, "Upstream did not return an event stream");
            Err(ColloquyError::UpstreamProtocol {
                message: format!("expected text/event-stream, got {ct}"),
            })
        }
        _ => Ok(()),
    }
}

/// Fragments decoded from a streaming HTTP response body.
pub struct HttpSource {
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    queue: EventQueue,
}

impl HttpSource {
    fn new(stream: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> Self {
        Self {
            stream,
            decoder: SseDecoder::new(),
            queue: EventQueue::default(),
        }
    }
}

#[async_trait]
impl FragmentSource for HttpSource {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(next) = self.queue.next() {
                return next;
            }
            match self.stream.next().await {
                Some(Ok(bytes)) => {
                    let events = self.decoder.push(&bytes);
                    self.queue.extend(events);
                }
                Some(Err(e)) => {
                    return Err(ColloquyError::Upstream {
                        message: e.to_string(),
                    });
                }
                None => {
                    self.queue.extend(self.decoder.finish());
                    self.queue.close();
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Opens a Messages API stream for each debate request.
#[derive(Debug, Clone)]
pub struct MessagesSourceFactory {
    client: MessagesClient,
}

impl MessagesSourceFactory {
    pub fn new(client: MessagesClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFactory for MessagesSourceFactory {
    async fn open(&self, request: &DebateRequest) -> Result<Box<dyn FragmentSource>> {
        let prompt = build_debate_prompt(request);
        let source = self.client.open(&prompt).await?;
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(MessagesClient::new(UpstreamConfig::default(), "  ").is_err());
    }

    #[test]
    fn request_body_streams_with_configured_model() {
        let config = UpstreamConfig {
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 1024,
            ..UpstreamConfig::default()
        };
        let client = MessagesClient::new(config, "sk-test").unwrap();
        let body = client.request_body("Begin the debate:");

        assert_eq!(body["model"], "claude-haiku-4-5");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Begin the debate:");
    }

    #[test]
    fn from_env_requires_key_variable() {
        let config = UpstreamConfig {
            api_key_env: "COLLOQUY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..UpstreamConfig::default()
        };
        let err = MessagesClient::from_env(config).unwrap_err();
        assert!(err.to_string().contains("COLLOQUY_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn non_event_stream_response_is_protocol_error() {
        assert!(check_content_type(None).is_ok());
        assert!(check_content_type(Some("text/event-stream")).is_ok());
        assert!(check_content_type(Some("text/event-stream; charset=utf-8")).is_ok());

        let err = check_content_type(Some("application/json")).unwrap_err();
        assert!(matches!(err, ColloquyError::UpstreamProtocol { .. }));
        assert!(err.is_upstream());
        assert!(err.to_string().contains("application/json"));
    }

    #[tokio::test]
    async fn http_source_decodes_chunked_body() {
        let body = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"[moderator]: Hi\"}}\n\ndata: {\"type\":\"message_stop\"}\n";
        let chunks: Vec<reqwest::Result<Vec<u8>>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let mut source = HttpSource::new(futures_util::stream::iter(chunks).boxed());

        assert_eq!(
            source.next_fragment().await.unwrap().as_deref(),
            Some("[moderator]: Hi")
        );
        assert_eq!(source.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn connection_refused_is_upstream_connection_error() {
        let config = UpstreamConfig {
            api_url: "http://127.0.0.1:9/v1/messages".to_string(),
            timeout_secs: 5,
            ..UpstreamConfig::default()
        };
        let client = MessagesClient::new(config, "sk-test").unwrap();
        let err = client.open("prompt").await.err().unwrap();
        assert!(matches!(err, ColloquyError::UpstreamConnection { .. }));
    }
}

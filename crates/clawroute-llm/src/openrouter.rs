//! OpenRouter - Multi-provider LLM Gateway
//!
//! Every endpoint the router knows about is an OpenRouter model identifier,
//! so a single provider instance serves all of them.
//!
//! Key features:
//! - OpenAI-compatible chat completions
//! - SSE streaming with optional final usage block
//! - Status-preserving errors so callers can classify failures

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::provider::LlmProvider;
use crate::stream::{CompletionStream, StreamSender, DEFAULT_STREAM_BUFFER};
use crate::redact::{redact_key, scrub_message};
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

// ============================================================================
// Constants
// ============================================================================

/// OpenRouter API base URL
pub const BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model (free tier)
pub const DEFAULT_MODEL: &str = "stepfun/step-3.5-flash:free";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default time allowed to establish a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Configuration
// ============================================================================

/// OpenRouter provider configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key
    pub api_key: SecretString,
    /// Base URL
    pub base_url: String,
    /// Default model
    pub default_model: String,
    /// Limit on a whole completion call. Streams are not bounded in total;
    /// for them this is the longest allowed gap between body reads.
    pub timeout: Duration,
    /// Limit on establishing the connection
    pub connect_timeout: Duration,
    /// App name (sent as `X-Title`)
    pub app_name: Option<String>,
    /// Site URL (sent as `HTTP-Referer`)
    pub site_url: Option<String>,
}

impl fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &redact_key(self.api_key.expose_secret()))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl OpenRouterConfig {
    /// Create a new configuration
    ///
    /// Fails with [`Error::MissingCredential`] when the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key: String = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::MissingCredential("OpenRouter API key is empty".to_string()));
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            app_name: Some("Clawroute".to_string()),
            site_url: None,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| Error::MissingCredential("OPENROUTER_API_KEY not set".to_string()))?;

        let mut config = Self::new(api_key)?;
        if let Ok(base_url) = std::env::var("OPENROUTER_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.default_model = model;
        }
        if let Ok(name) = std::env::var("OPENROUTER_APP_NAME") {
            config.app_name = Some(name);
        }
        config.site_url = std::env::var("OPENROUTER_SITE_URL").ok();
        Ok(config)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the app name
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the site URL
    #[must_use]
    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }
}

// ============================================================================
// API Types (OpenAI compatible)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    model: String,
    choices: Vec<OpenRouterChoice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<OpenRouterUsage> for TokenUsage {
    fn from(u: OpenRouterUsage) -> Self {
        TokenUsage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChunk {
    #[serde(default)]
    choices: Vec<OpenRouterStreamChoice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterStreamChoice {
    #[serde(default)]
    delta: OpenRouterDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenRouterDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterError {
    error: OpenRouterErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenRouterErrorDetail {
    message: String,
}

/// One decoded server-sent-events line
#[derive(Debug, PartialEq)]
enum SseLine {
    /// `data:` payload with text and/or usage
    Chunk {
        text: Option<String>,
        usage: Option<TokenUsage>,
    },
    /// `data: [DONE]`
    Done,
    /// Comments, keep-alives, blank lines, unparseable payloads
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<OpenRouterStreamChunk>(data) {
        Ok(chunk) => {
            let text = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|t| !t.is_empty());
            SseLine::Chunk {
                text,
                usage: chunk.usage.map(TokenUsage::from),
            }
        }
        Err(e) => {
            debug!(error = %e, "Skipping unparseable SSE payload");
            SseLine::Skip
        }
    }
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenRouter LLM provider
pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider
    ///
    /// The client itself only bounds connecting and each body read, so a
    /// stream may run as long as chunks keep arriving. Completions get their
    /// total limit per request.
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.timeout)
            .build()
            .map_err(|e| Error::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env()?)
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    /// Total limit applied to one request, none for streams
    fn total_timeout(&self, stream: bool) -> Option<Duration> {
        (!stream).then_some(self.config.timeout)
    }

    fn resolve_model<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        }
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            Error::Network(scrub_message(&e.to_string()))
        }
    }

    /// Send a request and return the response if the status is a success
    async fn send(&self, body: &OpenRouterRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .header("Content-Type", "application/json");

        if let Some(app_name) = &self.config.app_name {
            request = request.header("X-Title", app_name);
        }
        if let Some(site_url) = &self.config.site_url {
            request = request.header("HTTP-Referer", site_url);
        }
        if let Some(total) = self.total_timeout(body.stream) {
            request = request.timeout(total);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<OpenRouterError>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);

        if status.as_u16() == 429 {
            return Err(Error::RateLimit);
        }
        Err(Error::Api {
            status: status.as_u16(),
            message: scrub_message(&message),
        })
    }
}

/// Forward SSE payloads from the HTTP body into the stream channel
async fn pump_sse(response: reqwest::Response, sender: StreamSender, timeout_ms: u64) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            () = sender.cancelled() => {
                debug!("OpenRouter stream cancelled by consumer");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(line.trim()) {
                        SseLine::Done => return,
                        SseLine::Chunk { text, usage } => {
                            if let Some(text) = text {
                                if !sender.send_text(text).await {
                                    return;
                                }
                            }
                            if let Some(usage) = usage {
                                if !sender.send_usage(usage).await {
                                    return;
                                }
                            }
                        }
                        SseLine::Skip => {}
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "OpenRouter stream interrupted");
                let err = if e.is_timeout() {
                    Error::Timeout(timeout_ms)
                } else {
                    Error::Stream(scrub_message(&e.to_string()))
                };
                sender.send_error(err).await;
                return;
            }
            None => return,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = OpenRouterRequest {
            model: self.resolve_model(&request),
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
            stream_options: None,
        };

        debug!("Sending request to OpenRouter API");

        let response = self.send(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(&e))?;
        let response: OpenRouterResponse =
            serde_json::from_str(&text).map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage: response.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason,
            model: response.model,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let model = self.resolve_model(&request).to_string();
        let body = OpenRouterRequest {
            model: &model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        debug!("Opening OpenRouter stream");

        let response = self.send(&body).await?;
        let (sender, stream) = CompletionStream::channel(model, DEFAULT_STREAM_BUFFER);
        let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::spawn(pump_sse(response, sender, timeout_ms));
        Ok(stream)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = OpenRouterConfig::new("test-key-123456")
            .unwrap()
            .with_model("arcee-ai/trinity-large-preview:free")
            .with_timeout(Duration::from_secs(60))
            .with_app_name("TestApp");

        assert_eq!(config.api_key.expose_secret(), "test-key-123456");
        assert_eq!(config.default_model, "arcee-ai/trinity-large-preview:free");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.app_name, Some("TestApp".to_string()));
    }

    #[test]
    fn test_empty_key_is_missing_credential() {
        assert!(matches!(
            OpenRouterConfig::new("  "),
            Err(Error::MissingCredential(_))
        ));
    }

    #[test]
    fn test_debug_masks_key() {
        let config = OpenRouterConfig::new("sk-or-1234567890abcdefghij").unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("sk-o***ghij"));
        assert!(!debug.contains("1234567890"));
    }

    #[test]
    fn test_streams_have_no_total_timeout() {
        let config = OpenRouterConfig::new("test-key-123456")
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2));
        let provider = OpenRouterProvider::new(config).unwrap();

        assert_eq!(provider.total_timeout(false), Some(Duration::from_secs(5)));
        assert_eq!(provider.total_timeout(true), None);
        assert_eq!(provider.config().connect_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![Message::system("persona"), Message::user("hi")];
        let body = OpenRouterRequest {
            model: "m",
            messages: &messages,
            max_tokens: Some(4096),
            temperature: Some(0.7),
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            SseLine::Chunk {
                text: Some("Hel".to_string()),
                usage: None
            }
        );
    }

    #[test]
    fn test_parse_sse_usage_and_done() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7,"total_tokens":19}}"#;
        assert_eq!(
            parse_sse_line(line),
            SseLine::Chunk {
                text: None,
                usage: Some(TokenUsage::new(12, 7))
            }
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING"), SseLine::Skip);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
    }
}

//! Mock LLM Provider for testing
//!
//! Behaviour is scripted per model: a sticky behaviour applies to every call,
//! queued behaviours are consumed first, one per call.

use crate::completion::{CompletionRequest, CompletionResponse, TokenUsage};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use crate::stream::CompletionStream;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted outcome of one mock call
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Succeed with this content
    Respond {
        /// Completion text
        content: String,
        /// Usage to report (None: the service reports nothing)
        usage: Option<TokenUsage>,
    },
    /// Succeed after sleeping
    Slow {
        /// Completion text
        content: String,
        /// Simulated service latency
        delay: Duration,
    },
    /// Fail with an HTTP status
    Status(u16),
    /// Fail with a transport timeout
    Timeout,
    /// Streams deliver this content, then fail with a timeout; plain
    /// completions fail with the timeout at once
    CutOff {
        /// Text delivered before the failure
        content: String,
    },
    /// Never resolve
    Hang,
}

impl MockBehavior {
    /// Succeed with `content` and no usage report
    #[must_use]
    pub fn respond(content: impl Into<String>) -> Self {
        Self::Respond {
            content: content.into(),
            usage: None,
        }
    }

    /// Succeed with `content` and the given usage
    #[must_use]
    pub fn respond_with_usage(content: impl Into<String>, prompt: u32, completion: u32) -> Self {
        Self::Respond {
            content: content.into(),
            usage: Some(TokenUsage::new(prompt, completion)),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<MockBehavior>,
    sticky: Option<MockBehavior>,
}

/// A mock LLM provider with per-model scripted behaviour and a call log
pub struct MockProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a mock provider that answers every model with "mock response"
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the behaviour used for every call to `model`
    #[must_use]
    pub fn with_behavior(self, model: impl Into<String>, behavior: MockBehavior) -> Self {
        self.set_behavior(model, behavior);
        self
    }

    /// Set the behaviour used for every call to `model`
    pub fn set_behavior(&self, model: impl Into<String>, behavior: MockBehavior) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry(model.into()).or_default().sticky = Some(behavior);
    }

    /// Queue a one-shot behaviour for the next call to `model`
    pub fn enqueue(&self, model: impl Into<String>, behavior: MockBehavior) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry(model.into()).or_default().queued.push_back(behavior);
    }

    /// Models called so far, in call order
    #[must_use]
    pub fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }

    /// Requests received so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls made to `model`
    #[must_use]
    pub fn call_count(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.model == model)
            .count()
    }

    fn next_behavior(&self, request: &CompletionRequest) -> MockBehavior {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts
            .get_mut(&request.model)
            .and_then(|s| s.queued.pop_front().or_else(|| s.sticky.clone()))
            .unwrap_or_else(|| MockBehavior::respond("mock response"))
    }

    /// Resolve a behaviour to content and usage, or the scripted failure
    async fn play(behavior: MockBehavior) -> Result<(String, Option<TokenUsage>)> {
        match behavior {
            MockBehavior::Respond { content, usage } => Ok((content, usage)),
            MockBehavior::Slow { content, delay } => {
                tokio::time::sleep(delay).await;
                Ok((content, None))
            }
            MockBehavior::Status(429) => Err(Error::RateLimit),
            MockBehavior::Status(status) => Err(Error::Api {
                status,
                message: format!("mock failure {status}"),
            }),
            MockBehavior::Timeout | MockBehavior::CutOff { .. } => Err(Error::Timeout(0)),
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let behavior = self.next_behavior(&request);
        let (content, usage) = Self::play(behavior).await?;
        Ok(CompletionResponse {
            content,
            usage,
            finish_reason: Some("stop".to_string()),
            model: request.model,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let behavior = self.next_behavior(&request);
        if let MockBehavior::CutOff { content } = &behavior {
            return Ok(CompletionStream::from_chunks_then_error(
                request.model,
                split_chunks(content),
                Error::Timeout(0),
            ));
        }
        let (content, usage) = Self::play(behavior).await?;
        Ok(CompletionStream::from_chunks(request.model, split_chunks(&content), usage))
    }
}

fn split_chunks(content: &str) -> Vec<String> {
    content.split_inclusive(' ').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use futures::StreamExt;
    use tokio_test::{assert_err, assert_ok};

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest::new(model).with_message(Message::user("hi"))
    }

    #[tokio::test]
    async fn test_default_response() {
        let mock = MockProvider::new();
        let resp = assert_ok!(mock.complete(request("any")).await);
        assert_eq!(resp.content, "mock response");
        assert_eq!(resp.model, "any");
        assert_eq!(mock.called_models(), vec!["any".to_string()]);
    }

    #[tokio::test]
    async fn test_queued_behavior_precedes_sticky() {
        let mock = MockProvider::new().with_behavior("a", MockBehavior::respond("sticky"));
        mock.enqueue("a", MockBehavior::Status(503));

        let err = assert_err!(mock.complete(request("a")).await);
        assert_eq!(err.status(), Some(503));

        let resp = assert_ok!(mock.complete(request("a")).await);
        assert_eq!(resp.content, "sticky");
        assert_eq!(mock.call_count("a"), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_rate_limit() {
        let mock = MockProvider::new().with_behavior("a", MockBehavior::Status(429));
        let err = assert_err!(mock.complete(request("a")).await);
        assert!(matches!(err, Error::RateLimit));
    }

    #[tokio::test]
    async fn test_stream_splits_content() {
        let mock = MockProvider::new()
            .with_behavior("a", MockBehavior::respond_with_usage("one two three", 5, 3));
        let stream = assert_ok!(mock.complete_stream(request("a")).await);
        assert_eq!(stream.model(), "a");
        let text = assert_ok!(stream.collect_text().await);
        assert_eq!(text, "one two three");
    }

    #[tokio::test]
    async fn test_cut_off_stream_fails_after_content() {
        let mock = MockProvider::new().with_behavior(
            "a",
            MockBehavior::CutOff {
                content: "partial answer".to_string(),
            },
        );
        let err = assert_err!(mock.complete(request("a")).await);
        assert!(matches!(err, Error::Timeout(_)));

        let mut stream = assert_ok!(mock.complete_stream(request("a")).await);
        assert_eq!(assert_ok!(stream.next().await.unwrap()), "partial ");
        assert_eq!(assert_ok!(stream.next().await.unwrap()), "answer");
        assert!(matches!(stream.next().await, Some(Err(Error::Timeout(_)))));
    }
}

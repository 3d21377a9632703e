//! Router request options and results

use crate::category::TaskCategory;
use crate::circuit_breaker::CircuitState;
use clawroute_llm::{CompletionStream, TokenUsage};
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Replaces the chat persona
    pub system_context: Option<String>,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

impl RouteOptions {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system context
    #[must_use]
    pub fn with_system_context(mut self, context: impl Into<String>) -> Self {
        self.system_context = Some(context.into());
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a routed completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    /// Completion text
    pub output: String,
    /// Endpoint that served the request
    pub endpoint: String,
    /// Model id reported by the service
    pub model: String,
    /// Category of the step that succeeded
    pub category: TaskCategory,
    /// Category the request started with
    pub requested_category: TaskCategory,
    /// Latency of the successful call
    pub latency: Duration,
    /// Token counts (reported, or estimated from characters)
    pub usage: TokenUsage,
    /// True when `usage` is a character-based estimate
    pub usage_estimated: bool,
    /// Estimated cost in USD
    pub estimated_cost_usd: f64,
    /// Endpoints tried, including the successful one
    pub attempts: usize,
    /// Endpoint a fallback moved away from
    pub fallback_from: Option<String>,
}

/// A routed streaming completion
///
/// Read chunks through [`Stream`] or [`collect_text`](Self::collect_text).
/// Cost is recorded when the stream ends, fails, is cancelled or dropped.
#[derive(Debug)]
pub struct RoutedStream {
    /// Endpoint that opened the stream
    pub endpoint: String,
    /// Category of the step that succeeded
    pub category: TaskCategory,
    /// Category the request started with
    pub requested_category: TaskCategory,
    /// Time to open the stream
    pub latency: Duration,
    /// Endpoints tried, including the successful one
    pub attempts: usize,
    /// Endpoint a fallback moved away from
    pub fallback_from: Option<String>,
    pub(crate) stream: CompletionStream,
}

impl RoutedStream {
    /// Stop the producer and finalize accounting
    pub fn cancel(&mut self) {
        self.stream.cancel();
    }

    /// Whether the stream ended, failed or was cancelled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.stream.is_finished()
    }

    /// Drain into a single string
    pub async fn collect_text(self) -> clawroute_llm::Result<String> {
        self.stream.collect_text().await
    }

    /// Underlying completion stream
    #[must_use]
    pub fn into_inner(self) -> CompletionStream {
        self.stream
    }
}

impl Stream for RoutedStream {
    type Item = clawroute_llm::Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().stream).poll_next(cx)
    }
}

/// Observable state of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSnapshot {
    /// Endpoint identifier
    pub endpoint: String,
    /// Breaker state
    pub circuit: CircuitState,
    /// Consecutive failures
    pub failures: u32,
    /// Window success rate
    pub success_rate: f64,
    /// Window average latency
    pub avg_latency_ms: f64,
    /// Samples in the window
    pub samples: usize,
    /// Health-derived discount
    pub weight_penalty: f64,
    /// Health verdict
    pub healthy: bool,
}

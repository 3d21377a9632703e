//! LLM Provider trait definition
//!
//! This module defines the completion-service seam the router dispatches through.

use crate::completion::{CompletionRequest, CompletionResponse};
use crate::error::Result;
use crate::stream::CompletionStream;

/// Trait for completion-providing services
///
/// One provider serves many endpoints: the endpoint identifier travels in
/// [`CompletionRequest::model`].
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model used when a request leaves `model` empty
    fn default_model(&self) -> &str;

    /// Complete a conversation and return the full text
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Complete a conversation as an incremental text stream
    ///
    /// Returns once the service accepted the request; transport errors after
    /// that point surface as stream items.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}

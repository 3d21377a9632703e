//! Clawroute LLM - Completion service abstraction
//!
//! This crate provides the collaborator the routing core talks to:
//! - Provider: `LlmProvider` trait for plain and streaming completions
//! - OpenRouter: OpenAI-compatible gateway provider (HTTP + SSE)
//! - Stream: cancellable, single-consumption completion stream
//! - Mock: scripted provider for tests and offline runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod mock;
pub mod openrouter;
pub mod provider;
mod redact;
pub mod stream;

pub use completion::{estimate_tokens, CompletionRequest, CompletionResponse, TokenUsage};
pub use error::{Error, Result};
pub use message::{Message, MessageRole};
pub use mock::{MockBehavior, MockProvider};
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};
pub use provider::LlmProvider;
pub use stream::{CompletionStream, StreamFinishHook, StreamSender, StreamSummary};

//! Clawroute Core - Request routing and failover engine
//!
//! This crate decides which completion endpoint serves a prompt and what
//! happens when that endpoint misbehaves:
//! - Classifier: maps free text to a task category
//! - Circuit breaker: per-endpoint failure isolation with cooldown
//! - Health: sliding-window success rate, latency and weight penalty
//! - Cost: per-endpoint session spend and a lifetime grand total
//! - Routing log: one structured record per call attempt
//! - Router: candidate selection and a bounded fallback chain

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod category;
pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod cost;
pub mod error;
pub mod health;
pub mod router;
pub mod routing_log;

pub use category::{RequestedCategory, TaskCategory};
pub use circuit_breaker::{
    CallOutcome, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitSnapshot,
    CircuitState, DeferredPermit,
};
pub use classifier::{CategoryScores, Classification, ClassificationRule, TaskClassifier};
pub use config::{
    CandidateConfig, CategoryWeights, ClassifierConfig, EndpointDescriptor, LengthThresholds,
    LoggingConfig, RouterConfig,
};
pub use cost::{CostTracker, UsageRecord};
pub use error::{format_error_for_cli, Error, Result, UpstreamErrorKind, UserFriendlyError};
pub use health::{HealthConfig, HealthMonitor, HealthSnapshot};
pub use router::{
    compose_prompt, persona, CompletionResult, EndpointSnapshot, FallbackChain, RouteOptions,
    RoutedStream, Router,
};
pub use routing_log::{
    open_routing_log, JsonlRoutingLog, MemoryRoutingLog, NullRoutingLog, RoutingLogEntry,
    RoutingLogSink,
};

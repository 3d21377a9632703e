//! Router - candidate selection and failover
//!
//! The router classifies a prompt, picks an endpoint for its category,
//! calls it through that endpoint's circuit breaker and walks a bounded
//! fallback chain on failure.
//!
//! # Module Structure
//!
//! - `chain`: Degradation order of task categories
//! - `prompts`: Personas and prompt composition
//! - `registry`: Lazily created per-endpoint breaker and health state
//! - `types`: Options, results and snapshots
//! - `router_impl`: Router implementation

mod chain;
mod prompts;
mod registry;
mod router_impl;
mod types;


pub use chain::FallbackChain;
pub use prompts::{compose_prompt, persona};
pub use registry::{EndpointRegistry, EndpointState};
pub use router_impl::Router;
pub use types::{CompletionResult, EndpointSnapshot, RouteOptions, RoutedStream};

//! Router implementation
//!
//! One routed request walks a [`FallbackChain`]. Each step selects a single
//! endpoint for the step's category and calls it once through that
//! endpoint's circuit breaker, under the request timeout. A step fails when
//! the breaker rejects the call or the call itself fails; non-retryable
//! failures (`auth_error`, `bad_request`) end the request at once.
//!
//! A completion settles breaker and health bookkeeping when the call
//! returns. A stream settles them when it finishes, since it can still fail
//! while it is being consumed.

use super::chain::FallbackChain;
use super::prompts::system_prompt;
use super::registry::{EndpointRegistry, EndpointState};
use super::types::{CompletionResult, EndpointSnapshot, RouteOptions, RoutedStream};
use crate::category::{RequestedCategory, TaskCategory};
use crate::circuit_breaker::{CallOutcome, CircuitError, DeferredPermit};
use crate::classifier::TaskClassifier;
use crate::config::{RouterConfig, DEFAULT_MAX_TOKENS};
use crate::cost::CostTracker;
use crate::error::{Error, Result, UpstreamErrorKind};
use crate::routing_log::{open_routing_log, NullRoutingLog, RoutingLogEntry, RoutingLogSink};
use chrono::Utc;
use clawroute_llm::{
    CompletionRequest, LlmProvider, Message, OpenRouterProvider, StreamSummary, TokenUsage,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Endpoint chosen for one step
struct Selection {
    endpoint: String,
    substituted_from: Option<String>,
}

/// When a successful call is reported to the breaker and health monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    OnReturn,
    Deferred,
}

/// Successful step of the chain
struct Dispatched<T> {
    value: T,
    state: Arc<EndpointState>,
    pending: Option<DeferredPermit>,
    endpoint: String,
    category: TaskCategory,
    latency: Duration,
    attempts: usize,
    fallback_from: Option<String>,
    prompt_chars: usize,
}

/// Routes prompts to completion endpoints with failover
pub struct Router {
    config: RouterConfig,
    provider: Arc<dyn LlmProvider>,
    classifier: TaskClassifier,
    registry: EndpointRegistry,
    costs: Arc<CostTracker>,
    routing_log: Arc<dyn RoutingLogSink>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("provider", &self.provider.name())
            .field("default_endpoint", &self.config.default_endpoint)
            .field("endpoints", &self.registry.ids())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router over a completion provider
    pub fn new(config: RouterConfig, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            classifier: TaskClassifier::new(config.classifier.clone()),
            registry: EndpointRegistry::new(config.circuit_breaker.clone(), config.health.clone()),
            costs: Arc::new(CostTracker::new(config.endpoints.iter().cloned())),
            routing_log: Arc::new(NullRoutingLog),
            provider,
            config,
        })
    }

    /// Create a router over OpenRouter, reading the API key from the environment
    ///
    /// Refuses to start with [`Error::MissingCredential`] when no key is set.
    pub fn from_env(config: RouterConfig) -> Result<Self> {
        let provider = OpenRouterProvider::from_env()?;
        let sink = open_routing_log(&config.logging)?;
        Ok(Self::new(config, Arc::new(provider))?.with_routing_log(sink))
    }

    /// Replace the routing log sink
    #[must_use]
    pub fn with_routing_log(mut self, sink: Arc<dyn RoutingLogSink>) -> Self {
        self.routing_log = sink;
        self
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Classifier in use
    #[must_use]
    pub fn classifier(&self) -> &TaskClassifier {
        &self.classifier
    }

    /// Classify a prompt
    #[must_use]
    pub fn classify(&self, prompt: &str) -> TaskCategory {
        self.classifier.classify(prompt)
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Classify the prompt, then route it
    pub async fn auto_route(&self, prompt: &str, options: RouteOptions) -> Result<CompletionResult> {
        self.route(RequestedCategory::Auto, prompt, options).await
    }

    /// Route a prompt for a category and return the full completion
    #[instrument(skip_all, fields(chars = prompt.chars().count()))]
    pub async fn route(
        &self,
        category: impl Into<RequestedCategory>,
        prompt: &str,
        options: RouteOptions,
    ) -> Result<CompletionResult> {
        let (start, matched_keywords) = self.resolve(category.into(), prompt);

        let d = self
            .dispatch(
                start,
                prompt,
                &options,
                matched_keywords,
                Settlement::OnReturn,
                move |request| self.provider.complete(request),
            )
            .await?;

        let response = d.value;
        let (usage, usage_estimated) = match response.usage {
            Some(usage) => (usage, false),
            None => (
                TokenUsage::estimate(d.prompt_chars, response.content.chars().count()),
                true,
            ),
        };
        let record = self
            .costs
            .record(&d.endpoint, usage.prompt_tokens, usage.completion_tokens);

        Ok(CompletionResult {
            model: if response.model.is_empty() {
                d.endpoint.clone()
            } else {
                response.model
            },
            output: response.content,
            endpoint: d.endpoint,
            category: d.category,
            requested_category: start,
            latency: d.latency,
            usage,
            usage_estimated,
            estimated_cost_usd: record.estimated_cost,
            attempts: d.attempts,
            fallback_from: d.fallback_from,
        })
    }

    /// Classify the prompt, then open a routed stream
    pub async fn auto_route_stream(&self, prompt: &str, options: RouteOptions) -> Result<RoutedStream> {
        self.route_stream(RequestedCategory::Auto, prompt, options).await
    }

    /// Route a prompt for a category and return a stream of text chunks
    ///
    /// Breaker and health outcomes are recorded when the stream finishes:
    /// a producer error counts as a failure, a clean end as a success, and a
    /// stream cancelled or dropped by the caller records nothing. Cost is
    /// recorded in every case, from reported usage or a character-based
    /// estimate.
    #[instrument(skip_all, fields(chars = prompt.chars().count()))]
    pub async fn route_stream(
        &self,
        category: impl Into<RequestedCategory>,
        prompt: &str,
        options: RouteOptions,
    ) -> Result<RoutedStream> {
        let (start, matched_keywords) = self.resolve(category.into(), prompt);

        let d = self
            .dispatch(
                start,
                prompt,
                &options,
                matched_keywords,
                Settlement::Deferred,
                move |request| self.provider.complete_stream(request),
            )
            .await?;

        let mut stream = d.value;
        let costs = Arc::clone(&self.costs);
        let state = d.state;
        let pending = d.pending;
        let endpoint = d.endpoint.clone();
        let prompt_chars = d.prompt_chars;
        let open_latency = d.latency;
        stream.add_finish_hook(Box::new(move |summary: &StreamSummary| {
            let outcome = match (&summary.error, summary.completed) {
                (Some(error), _) => {
                    state
                        .health
                        .record_failure(millis(open_latency + summary.elapsed));
                    warn!(
                        endpoint = %endpoint,
                        chunks = summary.chunks,
                        error = %error,
                        "Stream failed after opening"
                    );
                    CallOutcome::Failure
                }
                (None, true) => {
                    state.health.record_success(millis(open_latency));
                    CallOutcome::Success
                }
                (None, false) => CallOutcome::Abandoned,
            };
            if let Some(permit) = pending {
                state.breaker.settle(permit, outcome);
            }

            let usage = summary
                .usage
                .unwrap_or_else(|| TokenUsage::estimate(prompt_chars, summary.chars));
            let record = costs.record(&endpoint, usage.prompt_tokens, usage.completion_tokens);
            debug!(
                endpoint = %endpoint,
                completed = summary.completed,
                chunks = summary.chunks,
                elapsed_ms = millis(summary.elapsed),
                cost_usd = record.estimated_cost,
                "Stream finished"
            );
        }));

        Ok(RoutedStream {
            endpoint: d.endpoint,
            category: d.category,
            requested_category: start,
            latency: d.latency,
            attempts: d.attempts,
            fallback_from: d.fallback_from,
            stream,
        })
    }

    fn resolve(&self, requested: RequestedCategory, prompt: &str) -> (TaskCategory, Vec<String>) {
        match requested {
            RequestedCategory::Fixed(category) => (category, Vec::new()),
            RequestedCategory::Auto => {
                let c = self.classifier.classify_detailed(prompt);
                info!(
                    category = %c.category,
                    rule = ?c.rule,
                    length = c.length,
                    "Auto-selected task category"
                );
                (c.category, c.matched_keywords)
            }
        }
    }

    /// Walk the fallback chain until one call succeeds
    #[instrument(
        skip(self, prompt, options, matched_keywords, settlement, call),
        fields(request_id = tracing::field::Empty)
    )]
    async fn dispatch<T, F, Fut>(
        &self,
        start: TaskCategory,
        prompt: &str,
        options: &RouteOptions,
        matched_keywords: Vec<String>,
        settlement: Settlement,
        call: F,
    ) -> Result<Dispatched<T>>
    where
        F: Fn(CompletionRequest) -> Fut,
        Fut: Future<Output = clawroute_llm::Result<T>>,
    {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let input_length = prompt.chars().count();
        let timeout = options.timeout.unwrap_or_else(|| self.config.request_timeout());
        let call = &call;

        let mut attempts = 0;
        let mut previous: Option<String> = None;
        let mut last_error: Option<Error> = None;

        for category in FallbackChain::new(start) {
            attempts += 1;
            let selection = self.select_endpoint(category);
            let endpoint = selection.endpoint;
            let state = self.registry.get_or_insert(&endpoint);
            let request = self.build_request(category, &endpoint, prompt, options);
            let prompt_chars = request.prompt_chars();
            let fallback_from = previous.clone().or(selection.substituted_from);

            let entry = |latency: Duration, error_type: Option<&str>, fallback_used: bool| {
                RoutingLogEntry {
                    request_id,
                    ts: Utc::now(),
                    task_type: category,
                    input_length,
                    matched_keywords: matched_keywords.clone(),
                    endpoint: endpoint.clone(),
                    fallback_used,
                    fallback_from: if error_type.is_some() {
                        Some(endpoint.clone())
                    } else {
                        fallback_from.clone()
                    },
                    error_type: error_type.map(str::to_string),
                    latency_ms: millis(latency),
                    attempt: attempts,
                }
            };

            debug!(endpoint = %endpoint, task = %category, attempt = attempts, "Trying endpoint");

            let started = Instant::now();
            let outcome = match state.breaker.try_acquire() {
                Ok(permit) => match tokio::time::timeout(timeout, call(request)).await {
                    Ok(Ok(value)) => Ok((value, permit)),
                    Ok(Err(source)) => {
                        permit.record_failure();
                        Err(CircuitError::Failed(source))
                    }
                    Err(_) => {
                        permit.record_failure();
                        Err(CircuitError::Failed(clawroute_llm::Error::Timeout(millis(timeout))))
                    }
                },
                Err(retry_after) => Err(CircuitError::Open { retry_after }),
            };
            let latency = started.elapsed();

            let err = match outcome {
                Ok((value, permit)) => {
                    let pending = match settlement {
                        Settlement::OnReturn => {
                            permit.record_success();
                            state.health.record_success(millis(latency));
                            None
                        }
                        Settlement::Deferred => Some(permit.defer()),
                    };
                    self.emit(entry(latency, None, fallback_from.is_some()));
                    info!(
                        endpoint = %endpoint,
                        task = %category,
                        latency_ms = millis(latency),
                        attempt = attempts,
                        "Routed request"
                    );
                    return Ok(Dispatched {
                        value,
                        state: Arc::clone(&state),
                        pending,
                        endpoint,
                        category,
                        latency,
                        attempts,
                        fallback_from,
                        prompt_chars,
                    });
                }
                Err(CircuitError::Open { retry_after }) => Error::CircuitOpen {
                    endpoint: endpoint.clone(),
                    retry_after,
                },
                Err(CircuitError::Failed(source)) => {
                    state.health.record_failure(millis(latency));
                    Error::Upstream {
                        endpoint: endpoint.clone(),
                        kind: UpstreamErrorKind::from_llm(&source),
                        source,
                    }
                }
            };

            let continues = err.is_retryable() && category.degrade().is_some();
            self.emit(entry(latency, Some(err.error_type()), continues));
            error!(
                endpoint = %endpoint,
                task = %category,
                error_type = err.error_type(),
                error = %err,
                "Endpoint call failed"
            );

            if !err.is_retryable() {
                return Err(err);
            }
            if let Some(next) = category.degrade() {
                warn!(from = %endpoint, from_task = %category, to_task = %next, "Falling back");
            }

            previous = Some(endpoint);
            last_error = Some(err);
        }

        let last = last_error.ok_or_else(|| Error::Config("empty fallback chain".to_string()))?;
        if attempts == 1 {
            Err(last)
        } else {
            Err(Error::AllCandidatesExhausted {
                attempts,
                last: Box::new(last),
            })
        }
    }

    fn emit(&self, entry: RoutingLogEntry) {
        if self.config.logging.debug_route {
            match serde_json::to_string(&entry) {
                Ok(json) => debug!(entry = %json, "Routing log entry"),
                Err(e) => debug!(error = %e, "Unserializable routing log entry"),
            }
        }
        self.routing_log.append(&entry);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Primary candidate for a category, swapped for a fallback when its
    /// health penalty is severe
    fn select_endpoint(&self, category: TaskCategory) -> Selection {
        let primary = self.pick_candidate(category);

        if self.config.health.dynamic_weighting {
            let state = self.registry.get_or_insert(&primary);
            if !state.health.is_healthy() {
                let penalty = state.health.weight_penalty();
                debug!(
                    endpoint = %primary,
                    penalty,
                    success_rate = state.health.success_rate(),
                    "Health penalty"
                );
                if penalty < 0.5 {
                    if let Some(fallback) = self.select_fallback(&primary) {
                        warn!(from = %primary, to = %fallback, penalty, "Substituting unhealthy endpoint");
                        self.registry.get_or_insert(&fallback);
                        return Selection {
                            endpoint: fallback,
                            substituted_from: Some(primary),
                        };
                    }
                }
            }
        }

        Selection {
            endpoint: primary,
            substituted_from: None,
        }
    }

    /// First healthy and available candidate, else first available, else first
    fn pick_candidate(&self, category: TaskCategory) -> String {
        let candidates = self.config.candidates.for_category(category);
        let Some(first) = candidates.first() else {
            return self.config.default_endpoint.clone();
        };

        let usable = |id: &String, need_healthy: bool| match self.registry.get(id) {
            None => true,
            Some(state) => {
                state.breaker.is_available() && (!need_healthy || state.health.is_healthy())
            }
        };

        candidates
            .iter()
            .find(|c| usable(*c, true))
            .or_else(|| candidates.iter().find(|c| usable(*c, false)))
            .unwrap_or(first)
            .clone()
    }

    /// Next configured fallback after `current`, distinct from it
    fn select_fallback(&self, current: &str) -> Option<String> {
        let fallbacks = &self.config.fallbacks;
        match fallbacks.iter().position(|f| f == current) {
            Some(i) if i + 1 < fallbacks.len() => Some(fallbacks[i + 1].clone()),
            _ => fallbacks.iter().find(|f| *f != current).cloned(),
        }
    }

    fn build_request(
        &self,
        category: TaskCategory,
        endpoint: &str,
        prompt: &str,
        options: &RouteOptions,
    ) -> CompletionRequest {
        let max_tokens = self
            .config
            .endpoint(endpoint)
            .map_or(DEFAULT_MAX_TOKENS, |e| e.max_tokens);

        CompletionRequest::new(endpoint)
            .with_message(Message::system(system_prompt(
                category,
                options.system_context.as_deref(),
            )))
            .with_message(Message::user(prompt))
            .with_temperature(category.temperature())
            .with_max_tokens(max_tokens)
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// State of one endpoint, if it was ever selected
    #[must_use]
    pub fn endpoint_snapshot(&self, endpoint: &str) -> Option<EndpointSnapshot> {
        self.registry
            .get(endpoint)
            .map(|state| snapshot(endpoint, &state))
    }

    /// State of every endpoint selected so far, sorted by id
    #[must_use]
    pub fn endpoint_snapshots(&self) -> Vec<EndpointSnapshot> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.endpoint_snapshot(&id))
            .collect()
    }

    /// Close an endpoint's breaker; false if the endpoint is unknown
    pub fn reset_endpoint(&self, endpoint: &str) -> bool {
        match self.registry.get(endpoint) {
            Some(state) => {
                state.breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Estimated cost in USD, 0 for an unknown endpoint
    #[must_use]
    pub fn estimate_cost(&self, endpoint: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.costs.estimate_cost(endpoint, input_tokens, output_tokens)
    }

    /// Spend since the last session reset
    #[must_use]
    pub fn session_cost(&self) -> f64 {
        self.costs.session_cost()
    }

    /// Session spend per endpoint
    #[must_use]
    pub fn cost_breakdown(&self) -> BTreeMap<String, f64> {
        self.costs.breakdown()
    }

    /// Lifetime spend
    #[must_use]
    pub fn grand_total_cost(&self) -> f64 {
        self.costs.grand_total()
    }

    /// Start a new cost session
    pub fn reset_session_cost(&self) {
        self.costs.reset_session();
    }
}

fn snapshot(endpoint: &str, state: &EndpointState) -> EndpointSnapshot {
    let circuit = state.breaker.snapshot();
    let health = state.health.snapshot();
    EndpointSnapshot {
        endpoint: endpoint.to_string(),
        circuit: circuit.state,
        failures: circuit.failures,
        success_rate: health.success_rate,
        avg_latency_ms: health.avg_latency_ms,
        samples: health.samples,
        weight_penalty: state.health.weight_penalty(),
        healthy: state.health.is_healthy(),
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

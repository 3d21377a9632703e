//! Circuit Breaker pattern implementation
//!
//! One breaker guards one endpoint. The breaker has three states:
//! - Closed: Normal operation, calls pass through
//! - Open: Failure threshold reached, calls are rejected until the cooldown ends
//! - HalfOpen: Cooldown elapsed, a single probing call is let through
//!
//! All bookkeeping for a breaker happens inside one short critical section.
//! The lock is never held while the guarded call is in flight.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures reached the threshold - calls are rejected
    Open,
    /// Cooldown elapsed - one probing call passes through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false the breaker never rejects a call
    pub enabled: bool,
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Cooldown before an open circuit lets a probe through
    pub reset_timeout_ms: u64,
    /// Probing calls allowed in flight while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 3,
            reset_timeout_ms: 5 * 60 * 1000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set reset timeout
    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable the breaker
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reset timeout as a duration
    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Failure of a call made through [`CircuitBreaker::execute`]
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit rejected the call; the operation was never invoked
    #[error("circuit open, retry after {}ms", retry_after.as_millis())]
    Open {
        /// Remaining cooldown
        retry_after: Duration,
    },
    /// The operation ran and failed
    #[error("{0}")]
    Failed(E),
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures
    pub failures: u32,
    /// Probes in flight
    pub half_open_calls: u32,
    /// Time since the last failure
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            half_open_calls: 0,
        }
    }
}

/// Circuit breaker for one endpoint
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState::default()),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Snapshot of all fields
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let s = self.lock();
        CircuitSnapshot {
            state: s.state,
            failures: s.failures,
            half_open_calls: s.half_open_calls,
            since_last_failure: s.last_failure.map(|t| t.elapsed()),
        }
    }

    /// True for CLOSED or HALF_OPEN, false for OPEN
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Whether a call made now would be let through
    ///
    /// Unlike [`is_closed`](Self::is_closed) this treats an open circuit whose
    /// cooldown has elapsed as available. It does not change state.
    #[must_use]
    pub fn is_available(&self) -> bool {
        if !self.config.enabled {
            return true;
        }
        let s = self.lock();
        match s.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => s.half_open_calls < self.max_probes(),
            CircuitState::Open => self.remaining_cooldown(&s).is_none(),
        }
    }

    fn max_probes(&self) -> u32 {
        self.config.half_open_max_calls.max(1)
    }

    /// Remaining cooldown of an open circuit, `None` once it has elapsed
    fn remaining_cooldown(&self, s: &BreakerState) -> Option<Duration> {
        let reset = self.config.reset_timeout();
        let elapsed = s.last_failure.map_or(Duration::MAX, |t| t.elapsed());
        if elapsed <= reset {
            Some(reset - elapsed)
        } else {
            None
        }
    }

    /// Ask permission for one call
    ///
    /// Fails with the remaining cooldown when the circuit is open. An open
    /// circuit whose cooldown has elapsed moves to half-open and hands out the
    /// probe permit. While half-open only `half_open_max_calls` probes may be in
    /// flight; extra callers are rejected with a zero cooldown.
    pub fn try_acquire(&self) -> std::result::Result<CallPermit<'_>, Duration> {
        if !self.config.enabled {
            return Ok(CallPermit::new(self, false));
        }

        let mut s = self.lock();
        if s.state == CircuitState::Open {
            if let Some(remaining) = self.remaining_cooldown(&s) {
                debug!(
                    name = %self.name,
                    retry_after_ms = remaining.as_millis() as u64,
                    "Circuit breaker rejected call"
                );
                return Err(remaining);
            }
            info!(name = %self.name, "Circuit breaker entering half-open state");
            s.state = CircuitState::HalfOpen;
            s.half_open_calls = 0;
        }

        if s.state == CircuitState::HalfOpen {
            if s.half_open_calls >= self.max_probes() {
                debug!(name = %self.name, "Half-open probe already in flight");
                return Err(Duration::ZERO);
            }
            s.half_open_calls += 1;
            return Ok(CallPermit::new(self, true));
        }

        Ok(CallPermit::new(self, false))
    }

    /// Run `operation` through the breaker
    ///
    /// The operation's error is always handed back after bookkeeping.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> std::result::Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let permit = self
            .try_acquire()
            .map_err(|retry_after| CircuitError::Open { retry_after })?;

        match operation().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(e) => {
                permit.record_failure();
                Err(CircuitError::Failed(e))
            }
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        self.on_success(false);
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        self.on_failure(false);
    }

    fn on_success(&self, probe: bool) {
        let mut s = self.lock();
        if s.state != CircuitState::Closed {
            info!(name = %self.name, was = %s.state, probe, "Circuit breaker closed");
        }
        s.state = CircuitState::Closed;
        s.failures = 0;
        s.half_open_calls = 0;
    }

    fn on_failure(&self, probe: bool) {
        let mut s = self.lock();
        s.failures = s.failures.saturating_add(1);
        s.last_failure = Some(Instant::now());
        if probe {
            s.half_open_calls = s.half_open_calls.saturating_sub(1);
        }

        debug!(
            name = %self.name,
            failures = s.failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        if self.config.enabled
            && s.failures >= self.config.failure_threshold
            && s.state != CircuitState::Open
        {
            warn!(name = %self.name, failures = s.failures, "Circuit breaker opened");
            s.state = CircuitState::Open;
            s.half_open_calls = 0;
        }
    }

    fn release_probe(&self) {
        let mut s = self.lock();
        s.half_open_calls = s.half_open_calls.saturating_sub(1);
    }

    /// Settle a permit that was deferred past the end of its call
    pub fn settle(&self, permit: DeferredPermit, outcome: CallOutcome) {
        match outcome {
            CallOutcome::Success => self.on_success(permit.probe),
            CallOutcome::Failure => self.on_failure(permit.probe),
            CallOutcome::Abandoned => {
                if permit.probe {
                    self.release_probe();
                }
            }
        }
    }

    /// Reset the circuit breaker to its initial state
    pub fn reset(&self) {
        *self.lock() = BreakerState::default();
        info!(name = %self.name, "Circuit breaker reset");
    }
}

/// Permission for one call, settled by recording its outcome
///
/// A permit dropped unsettled (the caller's future was cancelled) records
/// nothing and only frees its half-open probe slot.
#[must_use = "a permit must be settled with record_success or record_failure"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// Whether this permit is the half-open probe
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// The guarded call succeeded
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    /// The guarded call failed
    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    /// Detach from the breaker borrow; the outcome is reported later
    /// through [`CircuitBreaker::settle`]
    ///
    /// A half-open slot stays taken until then.
    pub fn defer(mut self) -> DeferredPermit {
        self.settled = true;
        DeferredPermit { probe: self.probe }
    }
}

/// A [`CallPermit`] whose outcome is known only after the call returned,
/// such as a stream that can still fail while it is consumed
#[must_use = "a deferred permit must be passed to CircuitBreaker::settle"]
#[derive(Debug)]
pub struct DeferredPermit {
    probe: bool,
}

/// Outcome reported for a [`DeferredPermit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Counts as a success
    Success,
    /// Counts as a failure
    Failure,
    /// The caller gave up; nothing is recorded
    Abandoned,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_reset_timeout(reset),
        )
    }

    async fn fail(cb: &CircuitBreaker) -> CircuitError<&'static str> {
        cb.execute(|| async { Err::<(), _>("boom") })
            .await
            .unwrap_err()
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.reset_timeout(), Duration::from_secs(300));
        assert_eq!(config.half_open_max_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_closed());
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.snapshot().since_last_failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let cb = breaker(3, Duration::from_secs(10));

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, CircuitError::Failed("boom")));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_closed());

        advance(Duration::from_secs(4)).await;
        let mut invoked = false;
        let err = cb
            .execute(|| {
                invoked = true;
                async { Ok::<_, &str>(()) }
            })
            .await
            .unwrap_err();
        assert!(!invoked);
        match err {
            CircuitError::Open { retry_after } => assert_eq!(retry_after, Duration::from_secs(6)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_boundary_is_inclusive() {
        let cb = breaker(1, Duration::from_secs(10));
        fail(&cb).await;

        advance(Duration::from_secs(10)).await;
        assert!(cb.try_acquire().is_err());
        assert!(!cb.is_available());

        advance(Duration::from_millis(1)).await;
        assert!(cb.is_available());
        let permit = cb.try_acquire().unwrap();
        assert!(permit.is_probe());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        permit.record_success();
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker(2, Duration::from_secs(5));
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        advance(Duration::from_secs(6)).await;
        let value = cb.execute(|| async { Ok::<_, &str>(42) }).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, Duration::from_secs(5));
        fail(&cb).await;
        fail(&cb).await;

        advance(Duration::from_secs(6)).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 3);

        // Cooldown restarts from the failed probe
        advance(Duration::from_secs(3)).await;
        assert!(matches!(
            fail(&cb).await,
            CircuitError::Open { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_in_flight() {
        let cb = breaker(1, Duration::from_secs(1));
        fail(&cb).await;
        advance(Duration::from_secs(2)).await;

        let probe = cb.try_acquire().unwrap();
        assert_eq!(cb.try_acquire().unwrap_err(), Duration::ZERO);

        // A cancelled probe frees its slot without recording anything
        drop(probe);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.failure_count(), 1);
        let probe = cb.try_acquire().unwrap();
        probe.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let cb = breaker(3, Duration::from_secs(5));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_outcomes() {
        let cb = breaker(2, Duration::from_secs(5));

        let permit = cb.try_acquire().unwrap().defer();
        cb.settle(permit, CallOutcome::Failure);
        let permit = cb.try_acquire().unwrap().defer();
        cb.settle(permit, CallOutcome::Abandoned);
        assert_eq!(cb.failure_count(), 1);

        let permit = cb.try_acquire().unwrap().defer();
        cb.settle(permit, CallOutcome::Failure);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_half_open_call_holds_slot_until_settled() {
        let cb = breaker(1, Duration::from_secs(5));
        cb.record_failure();
        advance(Duration::from_secs(6)).await;

        let trial = cb.try_acquire().unwrap();
        assert!(trial.is_probe());
        let deferred = trial.defer();
        assert_eq!(cb.try_acquire().unwrap_err(), Duration::ZERO);

        cb.settle(deferred, CallOutcome::Abandoned);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let retry = cb.try_acquire().unwrap().defer();
        cb.settle(retry, CallOutcome::Success);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_closed());
        assert_eq!(cb.snapshot().since_last_failure, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_rejects() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_enabled(false),
        );
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }
}

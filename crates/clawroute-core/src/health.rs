//! Endpoint health monitor
//!
//! Keeps a bounded FIFO window of recent outcomes per endpoint. Running sums
//! make every statistic O(1); eviction pops the oldest sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

const SUCCESS_PENALTY: f64 = 0.5;
const LATENCY_PENALTY: f64 = 0.8;

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Samples kept per endpoint
    pub window_size: usize,
    /// Minimum success rate to count as healthy
    pub success_rate_threshold: f64,
    /// Maximum average latency to count as healthy
    pub latency_threshold_ms: u64,
    /// Master switch for health-based decisions
    pub dynamic_weighting: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            success_rate_threshold: 0.9,
            latency_threshold_ms: 5000,
            dynamic_weighting: true,
        }
    }
}

/// One recorded call outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSample {
    /// Whether the call succeeded
    pub success: bool,
    /// Observed latency
    pub latency_ms: u64,
}

/// Point-in-time statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Mean of success flags (1.0 when empty)
    pub success_rate: f64,
    /// Mean latency (0 when empty)
    pub avg_latency_ms: f64,
    /// Samples in the window
    pub samples: usize,
    /// Time of the last recorded sample
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Window {
    samples: VecDeque<HealthSample>,
    successes: usize,
    latency_sum: u128,
    last_updated: Option<DateTime<Utc>>,
}

impl Window {
    fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            1.0
        } else {
            self.successes as f64 / self.samples.len() as f64
        }
    }

    fn avg_latency(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.latency_sum as f64 / self.samples.len() as f64
        }
    }
}

/// Sliding-window health statistics for one endpoint
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    window: Mutex<Window>,
}

impl HealthMonitor {
    /// Create an empty monitor
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        let capacity = config.window_size.max(1);
        Self {
            config,
            window: Mutex::new(Window {
                samples: VecDeque::with_capacity(capacity + 1),
                ..Window::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a successful call
    pub fn record_success(&self, latency_ms: u64) {
        self.push(HealthSample {
            success: true,
            latency_ms,
        });
    }

    /// Record a failed call
    pub fn record_failure(&self, latency_ms: u64) {
        self.push(HealthSample {
            success: false,
            latency_ms,
        });
    }

    fn push(&self, sample: HealthSample) {
        let capacity = self.config.window_size.max(1);
        let mut w = self.lock();

        w.samples.push_back(sample);
        w.successes += usize::from(sample.success);
        w.latency_sum += u128::from(sample.latency_ms);

        while w.samples.len() > capacity {
            if let Some(old) = w.samples.pop_front() {
                w.successes -= usize::from(old.success);
                w.latency_sum -= u128::from(old.latency_ms);
            }
        }
        w.last_updated = Some(Utc::now());
    }

    /// Mean of success flags over the window, 1.0 when empty
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.lock().success_rate()
    }

    /// Mean latency over the window, 0 when empty
    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        self.lock().avg_latency()
    }

    /// Number of samples in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Whether no samples were recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Healthy iff success rate and average latency are within thresholds.
    /// Always true when dynamic weighting is off.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if !self.config.dynamic_weighting {
            return true;
        }
        let w = self.lock();
        w.success_rate() >= self.config.success_rate_threshold
            && w.avg_latency() <= self.config.latency_threshold_ms as f64
    }

    /// Multiplicative discount: x0.5 for a low success rate, x0.8 for high latency
    #[must_use]
    pub fn weight_penalty(&self) -> f64 {
        if !self.config.dynamic_weighting {
            return 1.0;
        }
        let w = self.lock();
        let mut penalty = 1.0;
        if w.success_rate() < self.config.success_rate_threshold {
            penalty *= SUCCESS_PENALTY;
        }
        if w.avg_latency() > self.config.latency_threshold_ms as f64 {
            penalty *= LATENCY_PENALTY;
        }
        penalty
    }

    /// Samples currently in the window, oldest first
    #[must_use]
    pub fn samples(&self) -> Vec<HealthSample> {
        self.lock().samples.iter().copied().collect()
    }

    /// Snapshot of the statistics
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let w = self.lock();
        HealthSnapshot {
            success_rate: w.success_rate(),
            avg_latency_ms: w.avg_latency(),
            samples: w.samples.len(),
            last_updated: w.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(window_size: usize) -> HealthMonitor {
        HealthMonitor::new(HealthConfig {
            window_size,
            ..HealthConfig::default()
        })
    }

    #[test]
    fn test_empty_window_is_optimistic() {
        let m = monitor(5);
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.avg_latency_ms(), 0.0);
        assert!(m.is_healthy());
        assert_eq!(m.weight_penalty(), 1.0);
        assert!(m.snapshot().last_updated.is_none());
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let m = monitor(5);
        for i in 0..12 {
            m.record_success(i);
            assert!(m.len() <= 5);
        }
        assert_eq!(m.len(), 5);
        // Oldest evicted first: 7..=11 remain
        let latencies: Vec<u64> = m.samples().iter().map(|s| s.latency_ms).collect();
        assert_eq!(latencies, vec![7, 8, 9, 10, 11]);
        assert_eq!(m.avg_latency_ms(), 9.0);
    }

    #[test]
    fn test_eviction_keeps_running_sums_exact() {
        let m = monitor(4);
        m.record_failure(100);
        m.record_failure(100);
        m.record_success(10);
        m.record_success(10);
        assert_eq!(m.success_rate(), 0.5);

        m.record_success(10);
        m.record_success(10);
        assert_eq!(m.success_rate(), 1.0);
        assert_eq!(m.avg_latency_ms(), 10.0);
    }

    #[test]
    fn test_consecutive_failures_make_unhealthy() {
        let m = monitor(20);
        for _ in 0..20 {
            m.record_failure(50);
        }
        assert_eq!(m.success_rate(), 0.0);
        assert!(!m.is_healthy());
        assert_eq!(m.weight_penalty(), 0.5);
        assert!(m.snapshot().last_updated.is_some());
    }

    #[test]
    fn test_penalties_compose() {
        let m = monitor(10);
        m.record_failure(9000);
        m.record_success(9000);
        assert!((m.weight_penalty() - 0.4).abs() < 1e-9);

        let slow = monitor(10);
        slow.record_success(6000);
        assert!(!slow.is_healthy());
        assert!((slow.weight_penalty() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_dynamic_weighting_off() {
        let m = HealthMonitor::new(HealthConfig {
            dynamic_weighting: false,
            ..HealthConfig::default()
        });
        m.record_failure(60_000);
        assert!(m.is_healthy());
        assert_eq!(m.weight_penalty(), 1.0);
        assert_eq!(m.success_rate(), 0.0);
    }
}

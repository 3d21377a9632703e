//! Cost Tracker - spend accounting
//!
//! The session ledger is a concurrent map keyed by endpoint, so updates to
//! different endpoints never contend. The grand total is an `f64` stored as
//! bits in an atomic and only ever grows.

use super::record::UsageRecord;
use crate::config::EndpointDescriptor;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Per-endpoint session spend plus a lifetime grand total
#[derive(Debug)]
pub struct CostTracker {
    /// Pricing information, fixed at construction
    pricing: HashMap<String, EndpointDescriptor>,
    /// Session accumulators
    session: DashMap<String, f64>,
    /// Lifetime total, `f64` bits
    grand_total: AtomicU64,
    /// Record ID counter
    next_id: AtomicU64,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CostTracker {
    /// Create a tracker over a pricing table
    #[must_use]
    pub fn new(endpoints: impl IntoIterator<Item = EndpointDescriptor>) -> Self {
        Self {
            pricing: endpoints.into_iter().map(|e| (e.id.clone(), e)).collect(),
            session: DashMap::new(),
            grand_total: AtomicU64::new(0f64.to_bits()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pricing for an endpoint
    #[must_use]
    pub fn pricing(&self, endpoint: &str) -> Option<&EndpointDescriptor> {
        self.pricing.get(endpoint)
    }

    /// Estimate cost in USD, 0 for an unknown endpoint
    #[must_use]
    pub fn estimate_cost(&self, endpoint: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.pricing
            .get(endpoint)
            .map_or(0.0, |p| p.calculate_cost(input_tokens, output_tokens))
    }

    /// Add the estimate for one call to the session and the grand total
    pub fn record(&self, endpoint: &str, input_tokens: u32, output_tokens: u32) -> UsageRecord {
        let cost = self.estimate_cost(endpoint, input_tokens, output_tokens);

        *self.session.entry(endpoint.to_string()).or_insert(0.0) += cost;
        // Costs are never negative, so the total is non-decreasing
        let _ = self
            .grand_total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + cost.max(0.0)).to_bits())
            });

        debug!(
            endpoint = %endpoint,
            input_tokens,
            output_tokens,
            cost_usd = cost,
            "Recorded usage"
        );

        UsageRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            input_tokens,
            output_tokens,
            estimated_cost: cost,
        }
    }

    /// Sum of all session accumulators
    #[must_use]
    pub fn session_cost(&self) -> f64 {
        self.session.iter().map(|e| *e.value()).sum()
    }

    /// Session spend per endpoint
    #[must_use]
    pub fn breakdown(&self) -> BTreeMap<String, f64> {
        self.session
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Clear session accumulators; the grand total is kept
    pub fn reset_session(&self) {
        self.session.clear();
    }

    /// Lifetime spend
    #[must_use]
    pub fn grand_total(&self) -> f64 {
        f64::from_bits(self.grand_total.load(Ordering::Acquire))
    }
}

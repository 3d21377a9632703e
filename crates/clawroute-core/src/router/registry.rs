//! Endpoint registry
//!
//! Breaker and health state for every endpoint the router has selected,
//! created on first use. Entries are independent: each carries its own
//! locks, and the map shards by key, so no lock spans two endpoints.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::health::{HealthConfig, HealthMonitor};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Failure-isolation and health state of one endpoint
#[derive(Debug)]
pub struct EndpointState {
    /// Circuit breaker
    pub breaker: CircuitBreaker,
    /// Health window
    pub health: HealthMonitor,
}

/// Lazily populated map of endpoint state
#[derive(Debug)]
pub struct EndpointRegistry {
    breaker_config: CircuitBreakerConfig,
    health_config: HealthConfig,
    endpoints: DashMap<String, Arc<EndpointState>>,
}

impl EndpointRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(breaker_config: CircuitBreakerConfig, health_config: HealthConfig) -> Self {
        Self {
            breaker_config,
            health_config,
            endpoints: DashMap::new(),
        }
    }

    /// State for `endpoint`, if it was ever selected
    #[must_use]
    pub fn get(&self, endpoint: &str) -> Option<Arc<EndpointState>> {
        self.endpoints.get(endpoint).map(|e| Arc::clone(e.value()))
    }

    /// State for `endpoint`, created on first use
    pub fn get_or_insert(&self, endpoint: &str) -> Arc<EndpointState> {
        if let Some(state) = self.get(endpoint) {
            return state;
        }
        let entry = self.endpoints.entry(endpoint.to_string()).or_insert_with(|| {
            debug!(endpoint = %endpoint, "Registering endpoint state");
            Arc::new(EndpointState {
                breaker: CircuitBreaker::new(endpoint, self.breaker_config.clone()),
                health: HealthMonitor::new(self.health_config.clone()),
            })
        });
        Arc::clone(entry.value())
    }

    /// Identifiers of registered endpoints, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of registered endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint was registered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_insert_returns_same_state() {
        let registry = EndpointRegistry::new(CircuitBreakerConfig::default(), HealthConfig::default());
        assert!(registry.get("a").is_none());

        let first = registry.get_or_insert("a");
        first.health.record_failure(10);
        let second = registry.get_or_insert("a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.health.len(), 1);
        assert_eq!(second.breaker.name(), "a");

        registry.get_or_insert("b");
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.len(), 2);
    }
}

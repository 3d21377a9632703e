//! Usage records

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One accounted completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    /// Record ID (monotonic per tracker)
    pub id: u64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Endpoint identifier
    pub endpoint: String,
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
    /// Estimated cost (USD)
    pub estimated_cost: f64,
}

//! Cost Tracking - session and lifetime spend
//!
//! Estimates are computed from token counts and the endpoint pricing table.
//! Unknown endpoints cost nothing.
//!
//! # Module Structure
//!
//! - `record`: Usage record returned for each accounted call
//! - `tracker`: CostTracker implementation

mod record;
mod tracker;

#[cfg(test)]
mod tests;

pub use record::UsageRecord;
pub use tracker::CostTracker;

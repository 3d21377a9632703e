//! Tests for cost module

use super::*;
use crate::config::EndpointDescriptor;
use std::sync::Arc;

fn tracker() -> CostTracker {
    CostTracker::new(vec![
        EndpointDescriptor::new("a").with_pricing(1.0, 2.0),
        EndpointDescriptor::new("b").with_pricing(3.0, 4.0),
        EndpointDescriptor::new("free"),
    ])
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

#[test]
fn test_unknown_endpoint_costs_nothing() {
    let t = tracker();
    assert_eq!(t.estimate_cost("nope", 1_000_000, 1_000_000), 0.0);

    let record = t.record("nope", 10, 10);
    assert_eq!(record.estimated_cost, 0.0);
    assert_eq!(t.session_cost(), 0.0);
}

#[test]
fn test_estimate() {
    let t = tracker();
    assert!(approx(t.estimate_cost("a", 1_000_000, 500_000), 2.0));
    assert_eq!(t.estimate_cost("free", 1_000_000, 1_000_000), 0.0);
    assert_eq!(t.pricing("b").map(|p| p.price_per_1m_output), Some(4.0));
}

#[test]
fn test_session_sums_endpoints_and_breakdown_isolates() {
    let t = tracker();
    let ea = t.estimate_cost("a", 1000, 2000);
    let eb = t.estimate_cost("b", 3000, 4000);

    let ra = t.record("a", 1000, 2000);
    let rb = t.record("b", 3000, 4000);
    assert!(rb.id > ra.id);

    assert!(approx(t.session_cost(), ea + eb));
    let breakdown = t.breakdown();
    assert_eq!(breakdown.len(), 2);
    assert!(approx(breakdown["a"], ea));
    assert!(approx(breakdown["b"], eb));
}

#[test]
fn test_reset_session_keeps_grand_total() {
    let t = tracker();
    t.record("a", 1_000_000, 0);
    t.record("a", 1_000_000, 0);
    assert!(approx(t.session_cost(), 2.0));
    assert!(approx(t.grand_total(), 2.0));

    t.reset_session();
    assert_eq!(t.session_cost(), 0.0);
    assert!(t.breakdown().is_empty());
    assert!(approx(t.grand_total(), 2.0));

    t.record("b", 1_000_000, 0);
    assert!(approx(t.session_cost(), 3.0));
    assert!(approx(t.grand_total(), 5.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_are_not_lost() {
    let t = Arc::new(tracker());
    let mut handles = Vec::new();
    for i in 0..8 {
        let t = Arc::clone(&t);
        handles.push(tokio::spawn(async move {
            let endpoint = if i % 2 == 0 { "a" } else { "b" };
            for _ in 0..100 {
                t.record(endpoint, 1_000_000, 0);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    // 400 records at $1 plus 400 at $3
    assert!(approx(t.session_cost(), 1600.0));
    assert!(approx(t.grand_total(), 1600.0));
}

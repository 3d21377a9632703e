//! Integration tests for clawroute
//!
//! These tests drive the router end to end against the scripted mock
//! provider:
//! - clawroute-core: classification, failover, breaker recovery, costs
//! - clawroute-llm: mock provider and completion streams
//! - routing log: JSON-lines output on disk

use std::sync::Arc;
use std::time::Duration;

use clawroute_core::{
    CircuitBreakerConfig, CircuitState, EndpointDescriptor, Error, JsonlRoutingLog,
    MemoryRoutingLog, RouteOptions, Router, RouterConfig, TaskCategory,
};
use clawroute_llm::{MockBehavior, MockProvider};
use tokio_test::{assert_err, assert_ok};

const DEEPSEEK: &str = "deepseek/deepseek-v3.2";
const STEP: &str = "stepfun/step-3.5-flash:free";
const MINIMAX: &str = "minimax/minimax-m2.5";

fn priced_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config
        .endpoints
        .push(EndpointDescriptor::new(MINIMAX).with_pricing(0.3, 1.2));
    config
}

// ============================================================================
// Classification through the router
// ============================================================================

#[tokio::test]
async fn test_auto_route_uses_classifier_categories() {
    let mock = Arc::new(MockProvider::new());
    let router = Router::new(RouterConfig::default(), mock.clone()).unwrap();

    let strict = format!("{} formal", "Please check this argument carefully. ".repeat(3));
    let result = assert_ok!(router.auto_route(&strict, RouteOptions::new()).await);
    assert_eq!(result.requested_category, TaskCategory::ReasonStrict);
    assert_eq!(result.endpoint, DEEPSEEK);

    let tool = "Turn this into JSON with the shape {\"city\": string, \"days\": number} now";
    let result = assert_ok!(router.auto_route(tool, RouteOptions::new()).await);
    assert_eq!(result.requested_category, TaskCategory::Tool);

    let result = assert_ok!(router.auto_route("hello!", RouteOptions::new()).await);
    assert_eq!(result.endpoint, MINIMAX);

    assert_eq!(mock.called_models().len(), 3);
}

// ============================================================================
// Failover and recovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_single_probe() {
    let mut config = RouterConfig::default();
    config.circuit_breaker = CircuitBreakerConfig::default()
        .with_failure_threshold(1)
        .with_reset_timeout(Duration::from_secs(10));

    let mock = Arc::new(MockProvider::new());
    mock.enqueue(MINIMAX, MockBehavior::Status(503));
    mock.enqueue(
        MINIMAX,
        MockBehavior::Slow {
            content: "back".to_string(),
            delay: Duration::from_millis(100),
        },
    );
    let router = Router::new(config, mock.clone()).unwrap();

    assert_err!(router.route(TaskCategory::Chat, "hi", RouteOptions::new()).await);
    assert_eq!(router.endpoint_snapshot(MINIMAX).unwrap().circuit, CircuitState::Open);

    // Still cooling down
    let err = assert_err!(router.route(TaskCategory::Chat, "hi", RouteOptions::new()).await);
    assert!(matches!(err, Error::CircuitOpen { .. }));

    tokio::time::advance(Duration::from_secs(11)).await;

    // Two concurrent requests: the first becomes the probe, the second is
    // rejected while the probe is in flight
    let (probe, rejected) = tokio::join!(
        router.route(TaskCategory::Chat, "hi", RouteOptions::new()),
        router.route(TaskCategory::Chat, "hi", RouteOptions::new()),
    );
    let probe = assert_ok!(probe);
    assert_eq!(probe.output, "back");
    match assert_err!(rejected) {
        Error::CircuitOpen { retry_after, .. } => assert_eq!(retry_after, Duration::ZERO),
        other => panic!("unexpected error: {other}"),
    }

    let snap = router.endpoint_snapshot(MINIMAX).unwrap();
    assert_eq!(snap.circuit, CircuitState::Closed);
    assert_eq!(snap.failures, 0);
    assert_eq!(mock.call_count(MINIMAX), 2);
}

#[tokio::test]
async fn test_routing_log_file_records_every_attempt() {
    let dir = std::env::temp_dir().join(format!("clawroute-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("routing.log");
    let _ = std::fs::remove_file(&path);

    let mock = Arc::new(MockProvider::new().with_behavior(DEEPSEEK, MockBehavior::Status(500)));
    let router = Router::new(RouterConfig::default(), mock)
        .unwrap()
        .with_routing_log(Arc::new(JsonlRoutingLog::open(&path).unwrap()));

    let result = assert_ok!(
        router
            .route(TaskCategory::ReasonStrict, "prove it", RouteOptions::new())
            .await
    );
    assert_eq!(result.endpoint, STEP);
    // Dropping the router drops the sink and flushes its writer
    drop(router);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["endpoint"], DEEPSEEK);
    assert_eq!(lines[0]["errorType"], "server_error");
    assert_eq!(lines[0]["taskType"], "reason_strict");
    assert_eq!(lines[1]["endpoint"], STEP);
    assert_eq!(lines[1]["fallbackFrom"], DEEPSEEK);
    assert_eq!(lines[0]["requestId"], lines[1]["requestId"]);

    let _ = std::fs::remove_dir_all(&dir);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_routes_share_state() {
    let mock = Arc::new(
        MockProvider::new().with_behavior(MINIMAX, MockBehavior::respond_with_usage("ok", 1000, 1000)),
    );
    let log = Arc::new(MemoryRoutingLog::new());
    let router = Arc::new(
        Router::new(priced_config(), mock.clone())
            .unwrap()
            .with_routing_log(log.clone()),
    );

    let mut handles = Vec::new();
    for _ in 0..50 {
        let router = Arc::clone(&router);
        handles.push(tokio::spawn(async move {
            router.route(TaskCategory::Chat, "hi", RouteOptions::new()).await
        }));
    }
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    let per_call = router.estimate_cost(MINIMAX, 1000, 1000);
    assert!((router.session_cost() - 50.0 * per_call).abs() < 1e-9);
    assert!((router.grand_total_cost() - 50.0 * per_call).abs() < 1e-9);
    assert_eq!(mock.call_count(MINIMAX), 50);
    assert_eq!(log.entries().len(), 50);

    let snap = router.endpoint_snapshot(MINIMAX).unwrap();
    assert_eq!(snap.samples, 20);
    assert_eq!(snap.success_rate, 1.0);
}

#[tokio::test]
async fn test_streaming_end_to_end() {
    let mock = Arc::new(
        MockProvider::new().with_behavior(MINIMAX, MockBehavior::respond_with_usage("a b c", 10, 3)),
    );
    let router = Router::new(priced_config(), mock).unwrap();

    let stream = assert_ok!(router.auto_route_stream("hey", RouteOptions::new()).await);
    assert_eq!(stream.endpoint, MINIMAX);
    let text = assert_ok!(stream.collect_text().await);
    assert_eq!(text, "a b c");

    let expected = router.estimate_cost(MINIMAX, 10, 3);
    assert!((router.session_cost() - expected).abs() < 1e-12);
    assert_eq!(router.cost_breakdown().get(MINIMAX).copied(), Some(expected));
}

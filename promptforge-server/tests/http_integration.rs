//! HTTP dispatch tests through the real axum router.
//!
//! State is memory-backed, so these run without Postgres.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use promptforge_core::config::{AggregationConfig, DatabaseConfig, ServiceConfig};
use promptforge_core::{ExecutionLogRecord, ForgeConfig, InMemoryBlobStore};
use promptforge_server::http::build_router;
use promptforge_server::router::ForgeState;
use promptforge_server::subsystems::aggregate::TraceAggregator;
use promptforge_server::subsystems::memory::{InMemoryLogSource, InMemorySummaryStore};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

fn record(id: i64, trace_id: &str, success: bool, duration_ms: Option<i64>) -> ExecutionLogRecord {
    ExecutionLogRecord {
        id,
        tenant_id: 7,
        project_id: 70,
        trace_id: trace_id.to_string(),
        prompt_id: Some(1),
        prompt_version: Some(1),
        success,
        error_message: None,
        duration_ms,
        provider: Some("anthropic".to_string()),
        model: Some("claude-3".to_string()),
        usage: Some(r#"{"input_tokens":10,"output_tokens":4}"#.to_string()),
        blob_path: None,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(id),
    }
}

fn make_state() -> Arc<ForgeState> {
    let config = ForgeConfig {
        service: ServiceConfig {
            socket_path: "/tmp/promptforge-http-test.sock".to_string(),
            log_level: "info".to_string(),
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            ensure_schema: false,
        },
        blob: Default::default(),
        aggregation: AggregationConfig {
            max_attempts: 3,
            backoff_ms: 1,
            job_timeout_seconds: 5,
        },
        http: Default::default(),
    };
    let aggregator = TraceAggregator::new(
        Arc::new(InMemoryLogSource::with_logs(vec![
            record(1, "checkout", true, Some(120)),
            record(2, "checkout", true, Some(80)),
            record(3, "checkout", false, None),
        ])),
        Arc::new(InMemorySummaryStore::new()),
        Arc::new(InMemoryBlobStore::new()),
        config.aggregation.clone(),
    );
    Arc::new(ForgeState::new(None, Arc::new(aggregator), config))
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_aggregate(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/aggregate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ===========================================================================
// TEST 1: GET /version
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let app = build_router(make_state());
    let req = Request::builder()
        .method("GET")
        .uri("/version")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(json["version"].is_string());
    assert!(json["protocol"].as_str().unwrap().starts_with("promptforge/"));
}

// ===========================================================================
// TEST 2: GET /health in memory mode
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(make_state());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["socket"], "/tmp/promptforge-http-test.sock");
}

// ===========================================================================
// TEST 3: POST /aggregate then GET /summaries/...
// ===========================================================================
#[tokio::test]
async fn test_aggregate_then_fetch_summary() {
    let state = make_state();

    let resp = build_router(state.clone())
        .oneshot(post_aggregate(json!({
            "tenantId": 7,
            "projectId": 70,
            "traceId": "checkout"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["written"], true);
    assert_eq!(json["stats"]["totalLogs"], 3);
    assert_eq!(json["stats"]["totalDurationMs"], 200);
    assert!(json["snapshotPath"]
        .as_str()
        .unwrap()
        .starts_with("traces/7/"));

    let req = Request::builder()
        .uri("/summaries/7/70/checkout")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["stats"]["successCount"], 2);
    assert_eq!(json["stats"]["errorCount"], 1);
    assert_eq!(json["stats"]["usageRollup"]["anthropic"]["claude-3"]["count"], 3);
    assert_eq!(json["stats"]["usageRollup"]["anthropic"]["claude-3"]["input_tokens"], 30);
    assert_eq!(json["snapshot"]["logs"].as_array().unwrap().len(), 3);
}

// ===========================================================================
// TEST 4: POST /aggregate validation errors
// ===========================================================================
#[tokio::test]
async fn test_aggregate_rejects_bad_requests() {
    let state = make_state();

    let resp = build_router(state.clone())
        .oneshot(post_aggregate(json!({ "tenantId": 7, "traceId": "checkout" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = build_router(state)
        .oneshot(post_aggregate(json!({
            "tenantId": 0,
            "projectId": 70,
            "traceId": "checkout"
        })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "error");
}

// ===========================================================================
// TEST 5: GET /summaries for an unknown trace
// ===========================================================================
#[tokio::test]
async fn test_unknown_summary_is_404() {
    let req = Request::builder()
        .uri("/summaries/7/70/nope")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(make_state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

//! PromptForge HTTP API
//!
//! Axum server running alongside the IPC socket. Each endpoint is a thin
//! handler over an inner function returning `(StatusCode, Value)`, so the
//! logic is testable without going through axum dispatch.
//!
//! Endpoints:
//! - GET  /health: storage status
//! - GET  /version: server version info
//! - POST /aggregate: aggregate one trace
//! - GET  /summaries/:tenant_id/:project_id/:trace_id: summary + snapshot

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use promptforge_core::TraceKey;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::router::{self, ForgeState};
use crate::subsystems::aggregate::AggregateError;

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<ForgeState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/aggregate", post(aggregate_handler))
        .route(
            "/summaries/:tenant_id/:project_id/:trace_id",
            get(summary_handler),
        )
        .with_state(state)
}

/// Serve on `[http] host:port` until the shutdown signal fires.
pub async fn start_http_server(state: ForgeState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("PromptForge HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    pub tenant_id: Option<i64>,
    pub project_id: Option<i64>,
    pub trace_id: Option<String>,
    /// `false` queues the work and answers 202 immediately.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_wait() -> bool {
    true
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!({ "error": self.error, "status": self.status })
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn health_inner(state: &ForgeState) -> (StatusCode, serde_json::Value) {
    match router::health(state).await {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
                obj.insert(
                    "socket".to_string(),
                    serde_json::json!(state.config.service.socket_path),
                );
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": format!("promptforge/{}", promptforge_core::ipc::PROTOCOL_VERSION),
    })
}

pub async fn aggregate_inner(
    state: &ForgeState,
    req: AggregateRequest,
) -> (StatusCode, serde_json::Value) {
    let (Some(tenant_id), Some(project_id), Some(trace_id)) =
        (req.tenant_id, req.project_id, req.trace_id)
    else {
        return (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("tenantId, projectId and traceId are required").into_value(),
        );
    };
    let key = TraceKey::new(tenant_id, project_id, trace_id);

    if !req.wait {
        return match router::queue_aggregation(state, key) {
            Ok(data) => (StatusCode::ACCEPTED, data),
            Err(e) => aggregate_error_to_http(&e),
        };
    }

    let start = Instant::now();
    match router::aggregate_trace(state, &key).await {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert(
                    "took_ms".to_string(),
                    serde_json::json!(start.elapsed().as_millis() as u64),
                );
            }
            (StatusCode::OK, data)
        }
        Err(e) => aggregate_error_to_http(&e),
    }
}

pub async fn summary_inner(state: &ForgeState, key: TraceKey) -> (StatusCode, serde_json::Value) {
    if let Err(e) = key.validate() {
        return (StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string()).into_value());
    }
    match router::load_summary(state, &key).await {
        Ok(Some(data)) => (StatusCode::OK, data),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("No summary for trace {}", key)).into_value(),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new(e.to_string()).into_value(),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<ForgeState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn aggregate_handler(
    State(state): State<Arc<ForgeState>>,
    Json(req): Json<AggregateRequest>,
) -> impl IntoResponse {
    let (status, body) = aggregate_inner(&state, req).await;
    (status, Json(body))
}

pub async fn summary_handler(
    State(state): State<Arc<ForgeState>>,
    Path((tenant_id, project_id, trace_id)): Path<(i64, i64, String)>,
) -> impl IntoResponse {
    let (status, body) = summary_inner(&state, TraceKey::new(tenant_id, project_id, trace_id)).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

pub fn aggregate_error_status(error: &AggregateError) -> StatusCode {
    match error {
        AggregateError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        AggregateError::Conflict { .. } | AggregateError::RetriesExhausted { .. } => {
            StatusCode::CONFLICT
        }
        AggregateError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AggregateError::Snapshot(_) | AggregateError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn aggregate_error_to_http(error: &AggregateError) -> (StatusCode, serde_json::Value) {
    (
        aggregate_error_status(error),
        ErrorResponse::new(error.to_string()).into_value(),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

use crate::subsystems::aggregate::{
    spawn_aggregate_task, validate_key, AggregateError, TraceAggregator,
};
use crate::subsystems::summary::SummaryStore;
use promptforge_core::ipc::{ForgeRequest, ForgeResponse};
use promptforge_core::{ForgeConfig, ForgeError, TraceKey};
use sqlx::PgPool;
use std::sync::Arc;

/// Everything a request handler needs. `pool` is `None` in memory mode.
#[derive(Clone)]
pub struct ForgeState {
    pub pool: Option<PgPool>,
    pub aggregator: Arc<TraceAggregator>,
    pub config: ForgeConfig,
}

impl ForgeState {
    pub fn new(pool: Option<PgPool>, aggregator: Arc<TraceAggregator>, config: ForgeConfig) -> Self {
        Self {
            pool,
            aggregator,
            config,
        }
    }
}

pub async fn handle_request(request: ForgeRequest, state: &ForgeState) -> ForgeResponse {
    match request {
        ForgeRequest::Ping => ForgeResponse::pong(),
        ForgeRequest::Health => match health(state).await {
            Ok(data) => ForgeResponse::ok(data),
            Err(e) => ForgeResponse::err(format!("DB Health Check failed: {}", e)),
        },
        ForgeRequest::Aggregate {
            tenant_id,
            project_id,
            trace_id,
            wait,
        } => {
            let key = TraceKey::new(tenant_id, project_id, trace_id);
            if wait {
                match aggregate_trace(state, &key).await {
                    Ok(data) => ForgeResponse::ok(data),
                    Err(e) => ForgeResponse::err(e.to_string()),
                }
            } else {
                match queue_aggregation(state, key) {
                    Ok(data) => ForgeResponse::ok(data),
                    Err(e) => ForgeResponse::err(e.to_string()),
                }
            }
        }
        ForgeRequest::GetSummary {
            tenant_id,
            project_id,
            trace_id,
        } => {
            let key = TraceKey::new(tenant_id, project_id, trace_id);
            match load_summary(state, &key).await {
                Ok(Some(data)) => ForgeResponse::ok(data),
                Ok(None) => ForgeResponse::err(format!("No summary for trace {}", key)),
                Err(e) => ForgeResponse::err(e.to_string()),
            }
        }
    }
}

/// Storage status. Memory mode has nothing to probe.
pub async fn health(state: &ForgeState) -> Result<serde_json::Value, ForgeError> {
    let Some(pool) = &state.pool else {
        return Ok(serde_json::json!({
            "status": "healthy",
            "storage": "memory",
        }));
    };

    let pg_ver = promptforge_core::db::health_check(pool).await?;
    let summaries = promptforge_core::db::summary_count(pool).await?;
    Ok(serde_json::json!({
        "status": "healthy",
        "storage": "postgres",
        "postgresql": pg_ver,
        "summaries": summaries,
    }))
}

/// Run one aggregation to completion, bounded by `job_timeout_seconds`.
pub async fn aggregate_trace(
    state: &ForgeState,
    key: &TraceKey,
) -> Result<serde_json::Value, AggregateError> {
    let outcome = state.aggregator.aggregate_with_timeout(key).await?;
    let mut data = outcome.to_json();
    if let Some(obj) = data.as_object_mut() {
        obj.insert("trace".to_string(), serde_json::json!(key));
    }
    Ok(data)
}

/// Validate the key, then hand the aggregation to a background task.
pub fn queue_aggregation(state: &ForgeState, key: TraceKey) -> Result<serde_json::Value, AggregateError> {
    validate_key(&key)?;
    let data = serde_json::json!({ "queued": true, "trace": &key });
    spawn_aggregate_task(state.aggregator.clone(), key);
    Ok(data)
}

/// Summary row plus its snapshot document. A missing or unreadable snapshot
/// is reported as `null` rather than failing the lookup.
pub async fn load_summary(
    state: &ForgeState,
    key: &TraceKey,
) -> Result<Option<serde_json::Value>, ForgeError> {
    key.validate()?;
    let Some(row) = state.aggregator.summaries().fetch(key).await? else {
        return Ok(None);
    };
    let stats = row.stats()?;

    let snapshot = match state.aggregator.snapshots().read(&row.snapshot_path).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(trace = %key, path = %row.snapshot_path, error = %e, "Snapshot unreadable");
            None
        }
    };

    Ok(Some(serde_json::json!({
        "trace": key,
        "stats": stats,
        "snapshotPath": row.snapshot_path,
        "marker": row.marker,
        "createdAt": row.created_at,
        "updatedAt": row.updated_at,
        "snapshot": snapshot,
    })))
}

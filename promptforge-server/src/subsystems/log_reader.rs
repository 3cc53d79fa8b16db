//! Log reader: fetches the execution-log rows that make up one trace.
//!
//! Read-only boundary to the logging pipeline's table; no aggregation here.

use async_trait::async_trait;
use promptforge_core::{ExecutionLogRecord, ForgeError, TraceKey};
use sqlx::PgPool;

#[async_trait]
pub trait LogSource: Send + Sync {
    /// All rows sharing `key`, oldest first.
    async fn fetch_trace_logs(&self, key: &TraceKey) -> Result<Vec<ExecutionLogRecord>, ForgeError>;
}

pub struct PgLogReader {
    pool: PgPool,
}

impl PgLogReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSource for PgLogReader {
    async fn fetch_trace_logs(&self, key: &TraceKey) -> Result<Vec<ExecutionLogRecord>, ForgeError> {
        let rows: Vec<ExecutionLogRecord> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, project_id, trace_id, prompt_id, prompt_version,
                   success, error_message, duration_ms, provider, model, usage,
                   blob_path, created_at
            FROM execution_logs
            WHERE tenant_id = $1 AND project_id = $2 AND trace_id = $3
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.project_id)
        .bind(&key.trace_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(trace = %key, rows = rows.len(), "Fetched trace logs");
        Ok(rows)
    }
}

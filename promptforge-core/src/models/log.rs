use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution-log row. Written by the logging pipeline, read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExecutionLogRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub project_id: i64,
    pub trace_id: String,
    pub prompt_id: Option<i64>,
    pub prompt_version: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Provider-specific usage payload, stored verbatim.
    pub usage: Option<String>,
    /// Location of this log's own detail blob.
    pub blob_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log::ExecutionLogRecord;
use super::stats::TraceStats;

/// Full per-trace detail document written to blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSnapshot {
    pub trace_id: String,
    pub tenant_id: i64,
    pub project_id: i64,
    pub stats: TraceStats,
    pub logs: Vec<LogReference>,
    pub extracted_at: DateTime<Utc>,
}

/// Lightweight pointer to one execution log inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReference {
    pub id: i64,
    pub prompt_id: Option<i64>,
    pub version: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub blob_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&ExecutionLogRecord> for LogReference {
    fn from(log: &ExecutionLogRecord) -> Self {
        Self {
            id: log.id,
            prompt_id: log.prompt_id,
            version: log.prompt_version,
            success: log.success,
            error_message: log.error_message.clone(),
            duration_ms: log.duration_ms,
            blob_path: log.blob_path.clone(),
            created_at: log.created_at,
        }
    }
}

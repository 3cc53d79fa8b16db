use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stats::{TraceStats, UsageRollup};

/// The single durable aggregate row per (tenant, project, trace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TraceSummary {
    pub tenant_id: i64,
    pub project_id: i64,
    pub trace_id: String,
    pub total_logs: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub total_duration_ms: i64,
    pub first_log_at: DateTime<Utc>,
    pub last_log_at: DateTime<Utc>,
    pub usage_rollup: Option<String>,
    pub snapshot_path: String,
    /// Concurrency token. Carries no business meaning.
    pub marker: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TraceSummary {
    /// Rebuild the stats this row was written from.
    pub fn stats(&self) -> Result<TraceStats, serde_json::Error> {
        let usage_rollup = match &self.usage_rollup {
            Some(raw) => Some(serde_json::from_str::<UsageRollup>(raw)?),
            None => None,
        };
        Ok(TraceStats {
            total_logs: self.total_logs,
            success_count: self.success_count,
            error_count: self.error_count,
            total_duration_ms: self.total_duration_ms,
            first_log_at: self.first_log_at,
            last_log_at: self.last_log_at,
            usage_rollup,
        })
    }
}

/// Business fields of a summary write, before a marker is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryDraft {
    pub stats: TraceStats,
    pub snapshot_path: String,
    pub usage_rollup_json: Option<String>,
}

impl SummaryDraft {
    pub fn new(stats: TraceStats, snapshot_path: String) -> Result<Self, serde_json::Error> {
        let usage_rollup_json = match &stats.usage_rollup {
            Some(rollup) => Some(serde_json::to_string(rollup)?),
            None => None,
        };
        Ok(Self {
            stats,
            snapshot_path,
            usage_rollup_json,
        })
    }
}

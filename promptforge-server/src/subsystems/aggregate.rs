//! Aggregation orchestrator: turns a trace's log rows into a summary row.
//!
//! One attempt runs `ReadLog -> ComputeStats -> WriteSnapshot -> UpsertSummary`
//! strictly in order. A conflict at `UpsertSummary` restarts from `ReadLog`
//! after a delay of `backoff_ms * attempt`, up to `max_attempts` attempts in
//! total. Every other error ends the call immediately.
//!
//! Attempts are stateless: many workers may aggregate the same trace at once,
//! and the only coordination is the summary row's conditional write.

use chrono::Utc;
use promptforge_core::config::AggregationConfig;
use promptforge_core::{
    BlobStore, ForgeError, SummaryDraft, TraceKey, TraceStats, UsageRegistry,
};
use sqlx::PgPool;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::RetryIf;
use uuid::Uuid;

use super::log_reader::{LogSource, PgLogReader};
use super::snapshot::SnapshotWriter;
use super::stats::calculate_stats;
use super::summary::{upsert_summary, PgSummaryStore, SummaryStore, UpsertOutcome};

#[derive(Error, Debug)]
pub enum AggregateError {
    /// Another writer touched the summary row during this attempt. Retried.
    #[error("Concurrent summary write detected: {reason}")]
    Conflict { reason: &'static str },

    #[error("Aggregation gave up after {attempts} conflicting attempts")]
    RetriesExhausted { attempts: usize },

    /// The summary row is never touched after a failed snapshot write.
    #[error("Snapshot write failed: {0}")]
    Snapshot(ForgeError),

    #[error("Store error: {0}")]
    Store(ForgeError),

    #[error("Invalid trace key: {0}")]
    InvalidKey(String),

    #[error("Aggregation timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl AggregateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AggregateError::Conflict { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStage {
    ReadLog,
    ComputeStats,
    WriteSnapshot,
    UpsertSummary,
    Done,
}

impl fmt::Display for AggregationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationStage::ReadLog => "read_log",
            AggregationStage::ComputeStats => "compute_stats",
            AggregationStage::WriteSnapshot => "write_snapshot",
            AggregationStage::UpsertSummary => "upsert_summary",
            AggregationStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// No log rows for the trace; nothing was written.
    Empty { attempts: usize },
    Written {
        attempts: usize,
        created: bool,
        snapshot_path: String,
        marker: Uuid,
        stats: TraceStats,
    },
}

impl AggregateOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            AggregateOutcome::Empty { attempts } | AggregateOutcome::Written { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AggregateOutcome::Empty { attempts } => serde_json::json!({
                "written": false,
                "attempts": attempts,
            }),
            AggregateOutcome::Written {
                attempts,
                created,
                snapshot_path,
                marker,
                stats,
            } => serde_json::json!({
                "written": true,
                "created": created,
                "attempts": attempts,
                "snapshotPath": snapshot_path,
                "marker": marker,
                "stats": stats,
            }),
        }
    }
}

pub fn validate_key(key: &TraceKey) -> Result<(), AggregateError> {
    key.validate().map_err(|e| match e {
        ForgeError::InvalidKey(msg) => AggregateError::InvalidKey(msg),
        other => AggregateError::InvalidKey(other.to_string()),
    })
}

/// Delays before each retry: `backoff_ms * n` for n = 1, 2, ...
fn retry_delays(config: &AggregationConfig) -> impl Iterator<Item = Duration> {
    let backoff_ms = config.backoff_ms;
    (1..)
        .map(move |n: u64| Duration::from_millis(backoff_ms.saturating_mul(n)))
        .take(config.max_attempts.max(1) - 1)
}

pub struct TraceAggregator {
    logs: Arc<dyn LogSource>,
    summaries: Arc<dyn SummaryStore>,
    snapshots: SnapshotWriter,
    usage: Arc<UsageRegistry>,
    config: AggregationConfig,
}

impl TraceAggregator {
    pub fn new(
        logs: Arc<dyn LogSource>,
        summaries: Arc<dyn SummaryStore>,
        blobs: Arc<dyn BlobStore>,
        config: AggregationConfig,
    ) -> Self {
        Self {
            logs,
            summaries,
            snapshots: SnapshotWriter::new(blobs),
            usage: Arc::new(UsageRegistry::default()),
            config,
        }
    }

    /// Postgres-backed aggregator.
    pub fn from_pool(pool: PgPool, blobs: Arc<dyn BlobStore>, config: AggregationConfig) -> Self {
        Self::new(
            Arc::new(PgLogReader::new(pool.clone())),
            Arc::new(PgSummaryStore::new(pool)),
            blobs,
            config,
        )
    }

    pub fn with_usage_registry(mut self, usage: UsageRegistry) -> Self {
        self.usage = Arc::new(usage);
        self
    }

    pub fn summaries(&self) -> &dyn SummaryStore {
        self.summaries.as_ref()
    }

    pub fn snapshots(&self) -> &SnapshotWriter {
        &self.snapshots
    }

    pub async fn aggregate(
        &self,
        tenant_id: i64,
        project_id: i64,
        trace_id: &str,
    ) -> Result<AggregateOutcome, AggregateError> {
        self.aggregate_key(&TraceKey::new(tenant_id, project_id, trace_id))
            .await
    }

    pub async fn aggregate_key(&self, key: &TraceKey) -> Result<AggregateOutcome, AggregateError> {
        validate_key(key)?;

        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result = RetryIf::spawn(
            retry_delays(&self.config),
            move || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.attempt(key, attempt)
            },
            |e: &AggregateError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::info!(trace = %key, error = %e, "Summary conflict, restarting aggregation");
                }
                retry
            },
        )
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(AggregateError::Conflict { .. }) => {
                let attempts = attempts.load(Ordering::SeqCst);
                tracing::warn!(trace = %key, attempts, "Aggregation retries exhausted");
                Err(AggregateError::RetriesExhausted { attempts })
            }
            Err(e) => {
                tracing::error!(trace = %key, error = %e, "Aggregation failed");
                Err(e)
            }
        }
    }

    /// `aggregate_key` bounded by `job_timeout_seconds`. In-flight writes are
    /// not cancelled mid-statement; the caller just stops waiting.
    pub async fn aggregate_with_timeout(
        &self,
        key: &TraceKey,
    ) -> Result<AggregateOutcome, AggregateError> {
        let seconds = self.config.job_timeout_seconds;
        tokio::time::timeout(Duration::from_secs(seconds), self.aggregate_key(key))
            .await
            .map_err(|_| AggregateError::Timeout { seconds })?
    }

    async fn attempt(&self, key: &TraceKey, attempt: usize) -> Result<AggregateOutcome, AggregateError> {
        stage(key, attempt, AggregationStage::ReadLog);
        let logs = self
            .logs
            .fetch_trace_logs(key)
            .await
            .map_err(AggregateError::Store)?;

        stage(key, attempt, AggregationStage::ComputeStats);
        let Some(stats) = calculate_stats(&logs, &self.usage) else {
            stage(key, attempt, AggregationStage::Done);
            tracing::info!(trace = %key, "No logs for trace, nothing to aggregate");
            return Ok(AggregateOutcome::Empty { attempts: attempt });
        };

        stage(key, attempt, AggregationStage::WriteSnapshot);
        let snapshot_path = self
            .snapshots
            .write(key, &logs, &stats, Utc::now())
            .await
            .map_err(AggregateError::Snapshot)?;

        stage(key, attempt, AggregationStage::UpsertSummary);
        let draft = SummaryDraft::new(stats, snapshot_path)
            .map_err(|e| AggregateError::Store(e.into()))?;
        let upserted = upsert_summary(self.summaries.as_ref(), key, &draft).await?;

        stage(key, attempt, AggregationStage::Done);
        tracing::info!(
            trace = %key,
            attempt,
            total_logs = draft.stats.total_logs,
            marker = %upserted.marker(),
            "Trace aggregated"
        );

        Ok(AggregateOutcome::Written {
            attempts: attempt,
            created: matches!(upserted, UpsertOutcome::Created { .. }),
            marker: upserted.marker(),
            snapshot_path: draft.snapshot_path,
            stats: draft.stats,
        })
    }
}

fn stage(key: &TraceKey, attempt: usize, stage: AggregationStage) {
    tracing::trace!(trace = %key, attempt, %stage, "Aggregation stage");
}

/// Spawn an aggregation in the background and log its result.
pub fn spawn_aggregate_task(aggregator: Arc<TraceAggregator>, key: TraceKey) {
    tokio::spawn(async move {
        match aggregator.aggregate_key(&key).await {
            Ok(AggregateOutcome::Empty { .. }) => {
                tracing::debug!(trace = %key, "Background aggregation found no logs")
            }
            Ok(outcome) => tracing::info!(
                trace = %key,
                attempts = outcome.attempts(),
                "Background aggregation completed"
            ),
            Err(e) => tracing::error!(trace = %key, error = %e, "Background aggregation failed"),
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================

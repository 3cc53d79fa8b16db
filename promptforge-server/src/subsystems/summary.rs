//! Summary repository: one `trace_summaries` row per (tenant, project, trace).
//!
//! Writers coordinate only through the row's `marker` column:
//!
//! 1. read the row and remember its marker (`observed`)
//! 2. no row: INSERT; a unique-key violation means another writer got there
//!    first and the attempt is reported as a conflict
//! 3. row present: UPDATE ... WHERE marker = observed, then re-read and check
//!    the marker is the one this write set
//!
//! Any mismatch surfaces as [`AggregateError::Conflict`]; the orchestrator
//! restarts the whole attempt from the log read.

use async_trait::async_trait;
use promptforge_core::{ForgeError, SummaryDraft, TraceKey, TraceSummary};
use sqlx::PgPool;
use uuid::Uuid;

use super::aggregate::AggregateError;

/// Result of a plain INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The (tenant, project, trace) key already exists.
    DuplicateKey,
}

/// Row-level primitives the optimistic upsert is built from.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn fetch(&self, key: &TraceKey) -> Result<Option<TraceSummary>, ForgeError>;

    async fn insert(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        marker: Uuid,
    ) -> Result<InsertOutcome, ForgeError>;

    /// Update only if the stored marker still equals `observed`.
    /// Returns the number of rows affected (0 or 1).
    async fn update_if_marker(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        observed: Uuid,
        next: Uuid,
    ) -> Result<u64, ForgeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created { marker: Uuid },
    Updated { previous: Uuid, marker: Uuid },
}

impl UpsertOutcome {
    pub fn marker(&self) -> Uuid {
        match self {
            UpsertOutcome::Created { marker } | UpsertOutcome::Updated { marker, .. } => *marker,
        }
    }
}

/// A fresh marker guaranteed to differ from `observed`.
pub fn next_marker(observed: Option<Uuid>) -> Uuid {
    loop {
        let candidate = Uuid::new_v4();
        if Some(candidate) != observed {
            return candidate;
        }
    }
}

/// Insert or conditionally update the summary row for `key`.
pub async fn upsert_summary(
    store: &dyn SummaryStore,
    key: &TraceKey,
    draft: &SummaryDraft,
) -> Result<UpsertOutcome, AggregateError> {
    let current = store.fetch(key).await.map_err(AggregateError::Store)?;

    let Some(current) = current else {
        let marker = next_marker(None);
        return match store
            .insert(key, draft, marker)
            .await
            .map_err(AggregateError::Store)?
        {
            InsertOutcome::Inserted => {
                tracing::debug!(trace = %key, %marker, "Summary row created");
                Ok(UpsertOutcome::Created { marker })
            }
            InsertOutcome::DuplicateKey => Err(AggregateError::Conflict {
                reason: "summary row inserted concurrently",
            }),
        };
    };

    let observed = current.marker;
    let next = next_marker(Some(observed));

    let affected = store
        .update_if_marker(key, draft, observed, next)
        .await
        .map_err(AggregateError::Store)?;
    if affected == 0 {
        return Err(AggregateError::Conflict {
            reason: "summary row changed since it was read",
        });
    }

    let written = store.fetch(key).await.map_err(AggregateError::Store)?;
    match written {
        Some(row) if row.marker == next => {
            tracing::debug!(trace = %key, previous = %observed, marker = %next, "Summary row updated");
            Ok(UpsertOutcome::Updated {
                previous: observed,
                marker: next,
            })
        }
        _ => Err(AggregateError::Conflict {
            reason: "summary row overwritten after update",
        }),
    }
}

// ============================================================================
// Postgres
// ============================================================================

pub struct PgSummaryStore {
    pool: PgPool,
}

impl PgSummaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    async fn fetch(&self, key: &TraceKey) -> Result<Option<TraceSummary>, ForgeError> {
        let row: Option<TraceSummary> = sqlx::query_as(
            r#"
            SELECT tenant_id, project_id, trace_id, total_logs, success_count, error_count,
                   total_duration_ms, first_log_at, last_log_at, usage_rollup,
                   snapshot_path, marker, created_at, updated_at
            FROM trace_summaries
            WHERE tenant_id = $1 AND project_id = $2 AND trace_id = $3
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.project_id)
        .bind(&key.trace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        marker: Uuid,
    ) -> Result<InsertOutcome, ForgeError> {
        let stats = &draft.stats;
        let result = sqlx::query(
            r#"
            INSERT INTO trace_summaries (
                tenant_id, project_id, trace_id, total_logs, success_count, error_count,
                total_duration_ms, first_log_at, last_log_at, usage_rollup,
                snapshot_path, marker
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.project_id)
        .bind(&key.trace_id)
        .bind(stats.total_logs)
        .bind(stats.success_count)
        .bind(stats.error_count)
        .bind(stats.total_duration_ms)
        .bind(stats.first_log_at)
        .bind(stats.last_log_at)
        .bind(&draft.usage_rollup_json)
        .bind(&draft.snapshot_path)
        .bind(marker)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::debug!(trace = %key, "Summary insert hit unique key");
                Ok(InsertOutcome::DuplicateKey)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_if_marker(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        observed: Uuid,
        next: Uuid,
    ) -> Result<u64, ForgeError> {
        let stats = &draft.stats;
        let result = sqlx::query(
            r#"
            UPDATE trace_summaries
            SET total_logs = $5,
                success_count = $6,
                error_count = $7,
                total_duration_ms = $8,
                first_log_at = $9,
                last_log_at = $10,
                usage_rollup = $11,
                snapshot_path = $12,
                marker = $13,
                updated_at = NOW()
            WHERE tenant_id = $1 AND project_id = $2 AND trace_id = $3 AND marker = $4
            "#,
        )
        .bind(key.tenant_id)
        .bind(key.project_id)
        .bind(&key.trace_id)
        .bind(observed)
        .bind(stats.total_logs)
        .bind(stats.success_count)
        .bind(stats.error_count)
        .bind(stats.total_duration_ms)
        .bind(stats.first_log_at)
        .bind(stats.last_log_at)
        .bind(&draft.usage_rollup_json)
        .bind(&draft.snapshot_path)
        .bind(next)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

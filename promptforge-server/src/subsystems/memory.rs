//! In-memory log source and summary store.
//!
//! Same unique-key and conditional-update semantics as the Postgres
//! implementations. Used by tests and by the server's `memory` mode.
//! Data is lost when the struct is dropped.

use async_trait::async_trait;
use chrono::Utc;
use promptforge_core::{ExecutionLogRecord, ForgeError, SummaryDraft, TraceKey, TraceSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::log_reader::LogSource;
use super::summary::{InsertOutcome, SummaryStore};

// ===========================================================================
// InMemoryLogSource
// ===========================================================================

#[derive(Default)]
pub struct InMemoryLogSource {
    logs: RwLock<Vec<ExecutionLogRecord>>,
}

impl InMemoryLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logs(logs: Vec<ExecutionLogRecord>) -> Self {
        Self {
            logs: RwLock::new(logs),
        }
    }

    pub async fn append(&self, record: ExecutionLogRecord) {
        self.logs.write().await.push(record);
    }
}

#[async_trait]
impl LogSource for InMemoryLogSource {
    async fn fetch_trace_logs(&self, key: &TraceKey) -> Result<Vec<ExecutionLogRecord>, ForgeError> {
        let logs = self.logs.read().await;
        let mut rows: Vec<ExecutionLogRecord> = logs
            .iter()
            .filter(|l| {
                l.tenant_id == key.tenant_id
                    && l.project_id == key.project_id
                    && l.trace_id == key.trace_id
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

// ===========================================================================
// InMemorySummaryStore
// ===========================================================================

/// Summary rows keyed by (tenant, project, trace), with call counters.
#[derive(Default)]
pub struct InMemorySummaryStore {
    rows: RwLock<HashMap<TraceKey, TraceSummary>>,
    fetches: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn apply(row: &mut TraceSummary, draft: &SummaryDraft) {
    let stats = &draft.stats;
    row.total_logs = stats.total_logs;
    row.success_count = stats.success_count;
    row.error_count = stats.error_count;
    row.total_duration_ms = stats.total_duration_ms;
    row.first_log_at = stats.first_log_at;
    row.last_log_at = stats.last_log_at;
    row.usage_rollup = draft.usage_rollup_json.clone();
    row.snapshot_path = draft.snapshot_path.clone();
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn fetch(&self, key: &TraceKey) -> Result<Option<TraceSummary>, ForgeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn insert(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        marker: Uuid,
    ) -> Result<InsertOutcome, ForgeError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().await;
        if rows.contains_key(key) {
            return Ok(InsertOutcome::DuplicateKey);
        }

        let now = Utc::now();
        let stats = &draft.stats;
        rows.insert(
            key.clone(),
            TraceSummary {
                tenant_id: key.tenant_id,
                project_id: key.project_id,
                trace_id: key.trace_id.clone(),
                total_logs: stats.total_logs,
                success_count: stats.success_count,
                error_count: stats.error_count,
                total_duration_ms: stats.total_duration_ms,
                first_log_at: stats.first_log_at,
                last_log_at: stats.last_log_at,
                usage_rollup: draft.usage_rollup_json.clone(),
                snapshot_path: draft.snapshot_path.clone(),
                marker,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(InsertOutcome::Inserted)
    }

    async fn update_if_marker(
        &self,
        key: &TraceKey,
        draft: &SummaryDraft,
        observed: Uuid,
        next: Uuid,
    ) -> Result<u64, ForgeError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.write().await;
        match rows.get_mut(key) {
            Some(row) if row.marker == observed => {
                apply(row, draft);
                row.marker = next;
                row.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::stats::calculate_stats;
    use crate::subsystems::stats::tests::log;
    use promptforge_core::UsageRegistry;

    fn draft() -> SummaryDraft {
        let stats = calculate_stats(&[log(1, true, Some(5))], &UsageRegistry::default()).unwrap();
        SummaryDraft::new(stats, "p".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_log_source_filters_by_full_key() {
        let mut other_trace = log(3, true, None);
        other_trace.trace_id = "trace-2".to_string();
        let mut other_project = log(4, true, None);
        other_project.project_id = 99;

        let source = InMemoryLogSource::with_logs(vec![
            log(2, true, None),
            other_trace,
            other_project,
            log(1, false, None),
        ]);
        let rows = source
            .fetch_trace_logs(&TraceKey::new(1, 10, "trace-1"))
            .await
            .unwrap();

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_reported() {
        let store = InMemorySummaryStore::new();
        let key = TraceKey::new(1, 10, "trace-1");
        assert_eq!(
            store.insert(&key, &draft(), Uuid::new_v4()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert(&key, &draft(), Uuid::new_v4()).await.unwrap(),
            InsertOutcome::DuplicateKey
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_requires_matching_marker() {
        let store = InMemorySummaryStore::new();
        let key = TraceKey::new(1, 10, "trace-1");
        let m1 = Uuid::new_v4();
        store.insert(&key, &draft(), m1).await.unwrap();

        let stale = Uuid::new_v4();
        assert_eq!(
            store.update_if_marker(&key, &draft(), stale, Uuid::new_v4()).await.unwrap(),
            0
        );

        let m2 = Uuid::new_v4();
        assert_eq!(store.update_if_marker(&key, &draft(), m1, m2).await.unwrap(), 1);
        assert_eq!(store.fetch(&key).await.unwrap().unwrap().marker, m2);
        assert_eq!(store.update_calls(), 2);
    }
}

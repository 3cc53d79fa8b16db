//! Snapshot writer: serializes full trace detail to blob storage.
//!
//! Snapshots live at `traces/{tenant}/{UTC date}/{project}/{trace}/trace.json`
//! and are replaced wholesale on every aggregation. Concurrent writers are not
//! coordinated here: the last put wins.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use promptforge_core::{
    BlobStore, ExecutionLogRecord, ForgeError, LogReference, TraceKey, TraceSnapshot, TraceStats,
};
use std::sync::Arc;

pub const SNAPSHOT_FILE: &str = "trace.json";
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

/// Directory-style path for a trace snapshot, without the file name.
pub fn snapshot_path(key: &TraceKey, at: DateTime<Utc>) -> String {
    format!(
        "traces/{}/{}/{}/{}",
        key.tenant_id,
        at.format("%Y-%m-%d"),
        key.project_id,
        key.trace_id
    )
}

pub fn snapshot_object_key(path: &str) -> String {
    format!("{}/{}", path.trim_end_matches('/'), SNAPSHOT_FILE)
}

#[derive(Clone)]
pub struct SnapshotWriter {
    store: Arc<dyn BlobStore>,
}

impl SnapshotWriter {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Write the snapshot and return its path (file name excluded).
    pub async fn write(
        &self,
        key: &TraceKey,
        logs: &[ExecutionLogRecord],
        stats: &TraceStats,
        now: DateTime<Utc>,
    ) -> Result<String, ForgeError> {
        let snapshot = TraceSnapshot {
            trace_id: key.trace_id.clone(),
            tenant_id: key.tenant_id,
            project_id: key.project_id,
            stats: stats.clone(),
            logs: logs.iter().map(LogReference::from).collect(),
            extracted_at: now,
        };
        let body = serde_json::to_vec(&snapshot)?;

        let path = snapshot_path(key, now);
        let object_key = snapshot_object_key(&path);
        self.store
            .put(&object_key, Bytes::from(body), SNAPSHOT_CONTENT_TYPE)
            .await?;

        tracing::debug!(
            trace = %key,
            key = %object_key,
            backend = self.store.name(),
            logs = snapshot.logs.len(),
            "Trace snapshot written"
        );
        Ok(path)
    }

    /// Load the snapshot stored at `path`, if any.
    pub async fn read(&self, path: &str) -> Result<Option<TraceSnapshot>, ForgeError> {
        match self.store.get(&snapshot_object_key(path)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::usage::UsageCounters;

/// Aggregate counters for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub total_logs: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub total_duration_ms: i64,
    pub first_log_at: DateTime<Utc>,
    pub last_log_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage_rollup: Option<UsageRollup>,
}

/// Usage grouped by provider, then model.
///
/// Ordered maps keep the serialized form byte-stable for identical input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageRollup(pub BTreeMap<String, BTreeMap<String, ModelUsage>>);

impl UsageRollup {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entry(&mut self, provider: &str, model: &str) -> &mut ModelUsage {
        self.0
            .entry(provider.to_string())
            .or_default()
            .entry(model.to_string())
            .or_default()
    }

    pub fn get(&self, provider: &str, model: &str) -> Option<&ModelUsage> {
        self.0.get(provider).and_then(|models| models.get(model))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Rows that contributed a parseable usage payload.
    pub count: u64,
    #[serde(flatten)]
    pub tokens: UsageCounters,
}

//! Stats calculator: pure roll-up of a trace's log rows.
//!
//! - counts successes and errors
//! - sums non-null durations (null contributes zero, the sum saturates)
//! - tracks first/last `created_at`
//! - groups usage payloads by (lower-cased provider, model) through the usage
//!   registry
//!
//! Identical input always produces identical output, including the serialized
//! form of the usage rollup.

use promptforge_core::usage::{parse_payload, UsageRegistry};
use promptforge_core::{ExecutionLogRecord, TraceStats, UsageRollup};

/// Model name used when a row names a provider but no model.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Compute stats for one trace. Returns `None` for an empty row set.
pub fn calculate_stats(logs: &[ExecutionLogRecord], usage: &UsageRegistry) -> Option<TraceStats> {
    let first = logs.first()?;

    let mut stats = TraceStats {
        total_logs: 0,
        success_count: 0,
        error_count: 0,
        total_duration_ms: 0,
        first_log_at: first.created_at,
        last_log_at: first.created_at,
        usage_rollup: None,
    };
    let mut rollup = UsageRollup::default();

    for log in logs {
        stats.total_logs += 1;
        if log.success {
            stats.success_count += 1;
        } else {
            stats.error_count += 1;
        }

        if let Some(duration) = log.duration_ms {
            stats.total_duration_ms = stats.total_duration_ms.saturating_add(duration);
        }

        stats.first_log_at = stats.first_log_at.min(log.created_at);
        stats.last_log_at = stats.last_log_at.max(log.created_at);

        let (Some(provider), Some(raw)) = (log.provider.as_deref(), log.usage.as_deref()) else {
            continue;
        };

        match parse_payload(raw) {
            Ok(payload) => {
                let model = log.model.as_deref().unwrap_or(UNKNOWN_MODEL);
                let group = rollup.entry(&provider.to_ascii_lowercase(), model);
                group.count += 1;
                usage.accumulate(provider, &payload, &mut group.tokens);
            }
            Err(e) => {
                tracing::warn!(
                    log_id = log.id,
                    trace_id = %log.trace_id,
                    provider,
                    error = %e,
                    "Skipping malformed usage payload"
                );
            }
        }
    }

    if !rollup.is_empty() {
        stats.usage_rollup = Some(rollup);
    }

    Some(stats)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use promptforge_core::ExecutionLogRecord;

    pub(crate) fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn log(id: i64, success: bool, duration_ms: Option<i64>) -> ExecutionLogRecord {
        ExecutionLogRecord {
            id,
            tenant_id: 1,
            project_id: 10,
            trace_id: "trace-1".to_string(),
            prompt_id: Some(100),
            prompt_version: Some(3),
            success,
            error_message: if success { None } else { Some("boom".to_string()) },
            duration_ms,
            provider: None,
            model: None,
            usage: None,
            blob_path: Some(format!("logs/1/10/{}", id)),
            created_at: base_time() + Duration::seconds(id),
        }
    }

    pub(crate) fn with_usage(
        mut record: ExecutionLogRecord,
        provider: &str,
        model: Option<&str>,
        usage: &str,
    ) -> ExecutionLogRecord {
        record.provider = Some(provider.to_string());
        record.model = model.map(str::to_string);
        record.usage = Some(usage.to_string());
        record
    }

    // ========================================================================
    // Counters and durations
    // ========================================================================
    #[test]
    fn test_empty_log_set_yields_none() {
        assert!(calculate_stats(&[], &UsageRegistry::default()).is_none());
    }

    #[test]
    fn test_one_success_one_error() {
        let logs = vec![log(1, true, Some(1000)), log(2, false, Some(500))];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();

        assert_eq!(stats.total_logs, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.total_duration_ms, 1500);
        assert_eq!(stats.total_logs, stats.success_count + stats.error_count);
    }

    #[test]
    fn test_null_durations_contribute_zero() {
        let logs = vec![log(1, true, Some(100)), log(2, true, None), log(3, true, Some(200))];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert_eq!(stats.total_duration_ms, 300);
        assert_eq!(stats.total_logs, 3);
    }

    #[test]
    fn test_all_null_durations_sum_to_zero() {
        let logs = vec![log(1, true, None), log(2, false, None)];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert_eq!(stats.total_duration_ms, 0);
    }

    #[test]
    fn test_duration_sum_saturates() {
        let logs = vec![log(1, true, Some(i64::MAX)), log(2, true, Some(1))];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert_eq!(stats.total_duration_ms, i64::MAX);
        assert_eq!(stats.total_logs, 2);

        let logs = vec![log(1, false, Some(i64::MIN)), log(2, false, Some(-1))];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert_eq!(stats.total_duration_ms, i64::MIN);
    }

    #[test]
    fn test_first_and_last_ignore_row_order() {
        let logs = vec![log(5, true, None), log(1, true, None), log(9, true, None)];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert_eq!(stats.first_log_at, base_time() + Duration::seconds(1));
        assert_eq!(stats.last_log_at, base_time() + Duration::seconds(9));
    }

    // ========================================================================
    // Usage rollup
    // ========================================================================
    #[test]
    fn test_rollup_omitted_without_usage() {
        let logs = vec![log(1, true, Some(10))];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert!(stats.usage_rollup.is_none());

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("usageRollup").is_none());
    }

    #[test]
    fn test_rollup_groups_by_provider_and_model() {
        let logs = vec![
            with_usage(log(1, true, None), "openai", Some("gpt-4o"), r#"{"prompt_tokens":10,"completion_tokens":2}"#),
            with_usage(log(2, true, None), "openai", Some("gpt-4o"), r#"{"prompt_tokens":5,"completion_tokens":1}"#),
            with_usage(log(3, true, None), "anthropic", Some("claude"), r#"{"input_tokens":7,"output_tokens":3}"#),
            with_usage(log(4, true, None), "openai", None, r#"{"prompt_tokens":1}"#),
        ];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        let rollup = stats.usage_rollup.expect("rollup present");

        let gpt = rollup.get("openai", "gpt-4o").unwrap();
        assert_eq!(gpt.count, 2);
        assert_eq!(gpt.tokens.get("prompt_tokens"), Some(15));
        assert_eq!(gpt.tokens.get("completion_tokens"), Some(3));

        let claude = rollup.get("anthropic", "claude").unwrap();
        assert_eq!(claude.count, 1);
        assert_eq!(claude.tokens.get("output_tokens"), Some(3));

        assert_eq!(rollup.get("openai", UNKNOWN_MODEL).unwrap().count, 1);
    }

    #[test]
    fn test_provider_case_shares_one_group() {
        let logs = vec![
            with_usage(log(1, true, None), "OpenAI", Some("gpt"), r#"{"prompt_tokens":2}"#),
            with_usage(log(2, true, None), "openai", Some("gpt"), r#"{"prompt_tokens":3}"#),
        ];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        let rollup = stats.usage_rollup.unwrap();

        assert_eq!(rollup.0.len(), 1);
        assert!(rollup.get("OpenAI", "gpt").is_none());
        let gpt = rollup.get("openai", "gpt").unwrap();
        assert_eq!(gpt.count, 2);
        assert_eq!(gpt.tokens.get("prompt_tokens"), Some(5));
    }

    #[test]
    fn test_malformed_payload_is_skipped_not_fatal() {
        let logs = vec![
            with_usage(log(1, true, Some(10)), "openai", Some("gpt-4o"), "{not json"),
            with_usage(log(2, false, Some(20)), "openai", Some("gpt-4o"), r#"{"prompt_tokens":4}"#),
        ];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();

        assert_eq!(stats.total_logs, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.total_duration_ms, 30);
        let group = stats.usage_rollup.unwrap();
        let gpt = group.get("openai", "gpt-4o").unwrap();
        assert_eq!(gpt.count, 1);
        assert_eq!(gpt.tokens.get("prompt_tokens"), Some(4));
    }

    #[test]
    fn test_only_malformed_payloads_omit_rollup() {
        let logs = vec![with_usage(log(1, true, None), "openai", Some("gpt-4o"), "[1,2,3]")];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        assert!(stats.usage_rollup.is_none());
    }

    #[test]
    fn test_unknown_provider_counts_without_fields() {
        let logs = vec![with_usage(log(1, true, None), "mistral", Some("large"), r#"{"tokens":9}"#)];
        let stats = calculate_stats(&logs, &UsageRegistry::default()).unwrap();
        let rollup = stats.usage_rollup.unwrap();
        let group = rollup.get("mistral", "large").unwrap();
        assert_eq!(group.count, 1);
        assert!(group.tokens.is_empty());
    }

    #[test]
    fn test_usage_without_provider_is_ignored() {
        let mut record = log(1, true, None);
        record.usage = Some(r#"{"prompt_tokens":3}"#.to_string());
        let stats = calculate_stats(&[record], &UsageRegistry::default()).unwrap();
        assert!(stats.usage_rollup.is_none());
    }

    #[test]
    fn test_output_is_byte_identical_for_same_input() {
        let logs = vec![
            with_usage(log(1, true, Some(5)), "google", Some("gemini"), r#"{"promptTokenCount":3,"totalTokenCount":4}"#),
            with_usage(log(2, true, Some(5)), "anthropic", Some("claude"), r#"{"input_tokens":1}"#),
            with_usage(log(3, false, None), "openai", Some("gpt"), r#"{"total_tokens":8}"#),
        ];
        let registry = UsageRegistry::default();
        let a = serde_json::to_string(&calculate_stats(&logs, &registry)).unwrap();
        let b = serde_json::to_string(&calculate_stats(&logs, &registry)).unwrap();
        assert_eq!(a, b);
    }
}

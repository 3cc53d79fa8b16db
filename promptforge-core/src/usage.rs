//! Provider usage schemas.
//!
//! Each LLM provider reports token usage in its own shape. A [`UsageSchema`]
//! knows how to read one provider's payload into a flat set of counters, and
//! the [`UsageRegistry`] maps provider names to schemas. Adding a provider is
//! a `register` call; the aggregation loop never changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Key the rollup uses for its per-group row count. Counters may not use it.
pub const RESERVED_COUNT_FIELD: &str = "count";

/// Token counters keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageCounters(pub BTreeMap<String, u64>);

impl UsageCounters {
    /// Add `value` to `field`. The reserved `count` field is dropped so it
    /// cannot collide with the group row count in the serialized rollup.
    pub fn add(&mut self, field: &str, value: u64) {
        if field == RESERVED_COUNT_FIELD {
            tracing::warn!(field, "Ignoring usage counter with reserved name");
            return;
        }
        let slot = self.0.entry(field.to_string()).or_insert(0);
        *slot = slot.saturating_add(value);
    }

    pub fn get(&self, field: &str) -> Option<u64> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum UsagePayloadError {
    #[error("usage payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("usage payload is not a JSON object")]
    NotAnObject,
}

/// Parse a raw usage payload. Only JSON objects are accepted.
pub fn parse_payload(raw: &str) -> Result<Value, UsagePayloadError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(UsagePayloadError::NotAnObject)
    }
}

/// Reads one provider's usage payload into counters.
pub trait UsageSchema: Send + Sync {
    fn provider(&self) -> &str;

    fn accumulate(&self, payload: &Value, counters: &mut UsageCounters);
}

/// A schema described as `counter name -> candidate JSON paths`.
///
/// The first path that resolves to an unsigned integer wins.
#[derive(Clone, Copy)]
pub struct FieldMapSchema {
    provider: &'static str,
    fields: &'static [(&'static str, &'static [&'static [&'static str]])],
}

impl FieldMapSchema {
    pub const fn new(
        provider: &'static str,
        fields: &'static [(&'static str, &'static [&'static [&'static str]])],
    ) -> Self {
        Self { provider, fields }
    }
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |node, segment| node.get(segment))
}

impl UsageSchema for FieldMapSchema {
    fn provider(&self) -> &str {
        self.provider
    }

    fn accumulate(&self, payload: &Value, counters: &mut UsageCounters) {
        for (field, paths) in self.fields {
            if let Some(value) = paths
                .iter()
                .find_map(|path| lookup(payload, path).and_then(Value::as_u64))
            {
                counters.add(field, value);
            }
        }
    }
}

pub const OPENAI: FieldMapSchema = FieldMapSchema::new(
    "openai",
    &[
        ("prompt_tokens", &[&["prompt_tokens"]]),
        ("completion_tokens", &[&["completion_tokens"]]),
        ("total_tokens", &[&["total_tokens"]]),
        (
            "cached_tokens",
            &[&["prompt_tokens_details", "cached_tokens"]],
        ),
        (
            "reasoning_tokens",
            &[&["completion_tokens_details", "reasoning_tokens"]],
        ),
    ],
);

pub const ANTHROPIC: FieldMapSchema = FieldMapSchema::new(
    "anthropic",
    &[
        ("input_tokens", &[&["input_tokens"]]),
        ("output_tokens", &[&["output_tokens"]]),
        (
            "cache_creation_input_tokens",
            &[&["cache_creation_input_tokens"]],
        ),
        ("cache_read_input_tokens", &[&["cache_read_input_tokens"]]),
    ],
);

pub const GOOGLE: FieldMapSchema = FieldMapSchema::new(
    "google",
    &[
        (
            "prompt_token_count",
            &[&["promptTokenCount"], &["prompt_token_count"]],
        ),
        (
            "candidates_token_count",
            &[&["candidatesTokenCount"], &["candidates_token_count"]],
        ),
        (
            "total_token_count",
            &[&["totalTokenCount"], &["total_token_count"]],
        ),
        (
            "cached_content_token_count",
            &[&["cachedContentTokenCount"], &["cached_content_token_count"]],
        ),
        (
            "thoughts_token_count",
            &[&["thoughtsTokenCount"], &["thoughts_token_count"]],
        ),
    ],
);

/// Provider name (lower-cased) to usage schema.
#[derive(Clone)]
pub struct UsageRegistry {
    schemas: HashMap<String, Arc<dyn UsageSchema>>,
}

impl UsageRegistry {
    /// A registry that knows no providers.
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn register(&mut self, provider: &str, schema: Arc<dyn UsageSchema>) {
        self.schemas.insert(provider.to_ascii_lowercase(), schema);
    }

    pub fn schema_for(&self, provider: &str) -> Option<&dyn UsageSchema> {
        self.schemas
            .get(&provider.to_ascii_lowercase())
            .map(|schema| schema.as_ref())
    }

    /// Accumulate `payload` for `provider`. Unknown providers add nothing.
    pub fn accumulate(&self, provider: &str, payload: &Value, counters: &mut UsageCounters) {
        if let Some(schema) = self.schema_for(provider) {
            schema.accumulate(payload, counters);
        }
    }
}

impl Default for UsageRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let openai: Arc<dyn UsageSchema> = Arc::new(OPENAI);
        let google: Arc<dyn UsageSchema> = Arc::new(GOOGLE);

        for alias in ["openai", "azure", "openrouter"] {
            registry.register(alias, openai.clone());
        }
        registry.register("anthropic", Arc::new(ANTHROPIC));
        for alias in ["google", "gemini", "vertex"] {
            registry.register(alias, google.clone());
        }
        registry
    }
}

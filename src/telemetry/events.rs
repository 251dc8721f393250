//! Usage record schema.

use crate::pipeline::usage::UsageMetrics;
use crate::stage::StageKind;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One stage invocation's resource usage, as sent to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub stage_name: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub recorded_at: String,
}

impl UsageRecord {
    pub fn new(stage: StageKind, model: impl Into<String>, usage: &UsageMetrics) -> Self {
        Self {
            stage_name: stage.telemetry_name().to_string(),
            model: model.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_tokens: usage.cached_tokens,
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Collector ingestion event for a single generation.
    pub fn to_ingestion_event(&self, id: &str) -> Value {
        json!({
            "id": id,
            "timestamp": self.recorded_at,
            "type": "generation-create",
            "body": {
                "id": id,
                "name": self.stage_name,
                "model": self.model,
                "startTime": self.recorded_at,
                "usage": {
                    "input": self.prompt_tokens,
                    "output": self.completion_tokens,
                    "input_cached_tokens": self.cached_tokens,
                },
            },
        })
    }
}

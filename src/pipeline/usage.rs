//! Usage accounting: per-call token metrics and the running total on the pipeline state.

use crate::pipeline::state::PipelineState;
use crate::provider::TokenUsage;
use serde::{Deserialize, Serialize};

/// Resource usage reported by one stage call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_tokens: u64,
    pub total: u64,
}

impl UsageMetrics {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, cached_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_tokens,
            total: prompt_tokens + completion_tokens,
        }
    }

    /// Metrics carrying only a total, as scripted services report them.
    pub fn total_only(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: &UsageMetrics) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.cached_tokens += other.cached_tokens;
        self.total += other.total;
    }
}

impl From<TokenUsage> for UsageMetrics {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_tokens: usage.cached_prompt_tokens,
            total: usage.total_tokens,
        }
    }
}

/// Add one call's usage to the running total.
///
/// Takes `&mut PipelineState`, so every increment happens on the coordinating task;
/// research workers hand their metrics back instead of touching the state.
pub fn add_usage(state: &mut PipelineState, metrics: &UsageMetrics) {
    state.total_usage = state.total_usage.saturating_add(metrics.total);
}

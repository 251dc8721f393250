//! Pipeline state: the single record threaded through every stage of a run.

use crate::stage::{InputValue, StageInputs};
use serde::{Deserialize, Serialize};

/// Mutable run state. Owned by the orchestrator; stages and workers never hold it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    description: String,
    emphasizer: String,
    datetime: String,
    pub topics: Vec<String>,
    pub content: String,
    pub feedback: Option<String>,
    pub score: Option<f64>,
    pub retry_count: u32,
    pub total_usage: u64,
}

impl PipelineState {
    pub fn new(
        description: impl Into<String>,
        emphasizer: impl Into<String>,
        datetime: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            emphasizer: emphasizer.into(),
            datetime: datetime.into(),
            topics: Vec::new(),
            content: String::new(),
            feedback: None,
            score: None,
            retry_count: 0,
            total_usage: 0,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn emphasizer(&self) -> &str {
        &self.emphasizer
    }

    pub fn datetime(&self) -> &str {
        &self.datetime
    }

    pub fn plan_inputs(&self) -> StageInputs {
        StageInputs::new()
            .with("description", self.description.as_str())
            .with("feedback", self.feedback.clone())
            .with("emphasizer", self.emphasizer.as_str())
            .with("datetime", self.datetime.as_str())
    }

    /// Inputs shared by every research task of one pass; each task adds its own `topic`.
    pub fn research_snapshot(&self) -> StageInputs {
        StageInputs::new()
            .with("description", self.description.as_str())
            .with("datetime", self.datetime.as_str())
            .with("feedback", self.feedback.clone())
            .with("topics", InputValue::List(self.topics.clone()))
    }

    /// Inputs for Validate and Write, which both review the aggregated content.
    pub fn review_inputs(&self) -> StageInputs {
        StageInputs::new()
            .with("content", self.content.as_str())
            .with("description", self.description.as_str())
    }
}

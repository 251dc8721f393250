//! Stage Service Interface
//!
//! Every pipeline step (Plan, Research, Validate, Write) is a remote content-generation
//! call behind [`StageService`]. The orchestrator only sees named inputs going in and a
//! [`StageResult`] coming out; how the text is produced belongs to the implementation.

use crate::error::PipelineError;
use crate::pipeline::usage::UsageMetrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod llm;
pub mod prompts;
pub mod scripted;

pub use llm::LlmStage;
pub use scripted::ScriptedStage;

/// The four stage kinds of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Plan,
    Research,
    Validate,
    Write,
}

impl StageKind {
    /// Input keys a caller must supply before the stage may be invoked.
    pub fn required_inputs(self) -> &'static [&'static str] {
        match self {
            StageKind::Plan => &["description", "feedback", "emphasizer", "datetime"],
            StageKind::Research => &["topic", "description", "datetime", "feedback", "topics"],
            StageKind::Validate | StageKind::Write => &["content", "description"],
        }
    }

    /// Name used for usage records sent to the telemetry collector.
    pub fn telemetry_name(self) -> &'static str {
        match self {
            StageKind::Plan => "Plan Generation",
            StageKind::Research => "Section Research",
            StageKind::Validate => "Validate Research",
            StageKind::Write => "Write Research",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Plan => "Plan",
            StageKind::Research => "Research",
            StageKind::Validate => "Validate",
            StageKind::Write => "Write",
        };
        f.write_str(name)
    }
}

/// A single named stage input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Text(String),
    List(Vec<String>),
    /// Key is present but carries no value (e.g. feedback before the first validation).
    Absent,
}

impl InputValue {
    /// Render the value for prompt substitution.
    pub fn render(&self) -> String {
        match self {
            InputValue::Text(text) => text.clone(),
            InputValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {}", i + 1, item))
                .collect::<Vec<_>>()
                .join("\n"),
            InputValue::Absent => "None".to_string(),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl From<Vec<String>> for InputValue {
    fn from(value: Vec<String>) -> Self {
        InputValue::List(value)
    }
}

impl From<Option<String>> for InputValue {
    fn from(value: Option<String>) -> Self {
        value.map(InputValue::Text).unwrap_or(InputValue::Absent)
    }
}

/// Named inputs for one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageInputs {
    values: BTreeMap<String, InputValue>,
}

impl StageInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<InputValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(InputValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Keys required by `kind` that are not present.
    pub fn missing_for(&self, kind: StageKind) -> Vec<String> {
        kind.required_inputs()
            .iter()
            .filter(|key| !self.values.contains_key(**key))
            .map(|key| key.to_string())
            .collect()
    }

    /// Fail with `InputContractViolation` if any required key is missing.
    pub fn check(&self, kind: StageKind) -> Result<(), PipelineError> {
        let missing = self.missing_for(kind);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InputContractViolation {
                stage: kind,
                missing,
            })
        }
    }
}

/// Primary output of a stage call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageOutput {
    Text(String),
    Topics(Vec<String>),
    Verdict { score: f64, feedback: String },
}

impl StageOutput {
    pub fn into_text(self, stage: StageKind) -> Result<String, PipelineError> {
        match self {
            StageOutput::Text(text) => Ok(text),
            other => Err(unexpected_output(stage, "text", &other)),
        }
    }

    pub fn into_topics(self, stage: StageKind) -> Result<Vec<String>, PipelineError> {
        match self {
            StageOutput::Topics(topics) => Ok(topics),
            other => Err(unexpected_output(stage, "topic list", &other)),
        }
    }

    pub fn into_verdict(self, stage: StageKind) -> Result<(f64, String), PipelineError> {
        match self {
            StageOutput::Verdict { score, feedback } => Ok((score, feedback)),
            other => Err(unexpected_output(stage, "verdict", &other)),
        }
    }
}

fn unexpected_output(stage: StageKind, expected: &str, got: &StageOutput) -> PipelineError {
    let got = match got {
        StageOutput::Text(_) => "text",
        StageOutput::Topics(_) => "topic list",
        StageOutput::Verdict { .. } => "verdict",
    };
    PipelineError::MalformedOutput {
        stage,
        message: format!("expected {expected}, got {got}"),
        usage: UsageMetrics::default(),
    }
}

/// Result of a successful stage call. A call that consumed tokens but produced an unusable
/// reply fails with [`PipelineError::MalformedOutput`], which carries its usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub output: StageOutput,
    pub usage: UsageMetrics,
}

/// A remote content-generation stage.
#[async_trait]
pub trait StageService: Send + Sync {
    /// Which stage this service implements.
    fn kind(&self) -> StageKind;

    /// Model identifier reported to telemetry.
    fn model_name(&self) -> &str;

    /// Perform the remote call. May block on network I/O for a long time.
    async fn invoke(&self, inputs: &StageInputs) -> Result<StageResult, PipelineError>;
}

/// Check the input contract, then invoke. Missing keys never reach the service.
pub async fn invoke_checked(
    service: &dyn StageService,
    inputs: &StageInputs,
) -> Result<StageResult, PipelineError> {
    inputs.check(service.kind())?;
    service.invoke(inputs).await
}

//! LLM-backed stage services: render the stage prompt, call the model, parse the reply.

use crate::error::PipelineError;
use crate::pipeline::usage::UsageMetrics;
use crate::provider::{ChatMessage, CompletionOptions, ModelProviderClient};
use crate::stage::prompts;
use crate::stage::{StageInputs, StageKind, StageOutput, StageResult, StageService};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// A stage implemented by one chat completion.
pub struct LlmStage {
    kind: StageKind,
    client: Arc<dyn ModelProviderClient>,
    options: CompletionOptions,
}

impl LlmStage {
    pub fn new(
        kind: StageKind,
        client: Arc<dyn ModelProviderClient>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            kind,
            client,
            options,
        }
    }
}

#[async_trait]
impl StageService for LlmStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn model_name(&self) -> &str {
        self.client.model_name()
    }

    async fn invoke(&self, inputs: &StageInputs) -> Result<StageResult, PipelineError> {
        let (system, template) = prompts::templates(self.kind);
        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user(prompts::render(template, inputs)),
        ];
        debug!(stage = %self.kind, model = %self.client.model_name(), "invoking stage");
        let response = self.client.complete(messages, self.options.clone()).await?;
        let usage = UsageMetrics::from(response.usage);
        let output = parse_output(self.kind, &response.content)
            .map_err(|err| err.with_spent_usage(usage))?;
        Ok(StageResult { output, usage })
    }
}

#[derive(Deserialize)]
struct PlanPayload {
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct VerdictPayload {
    score: f64,
    #[serde(default)]
    feedback: Option<String>,
}

/// Map a raw completion into the stage's structured output.
pub fn parse_output(kind: StageKind, raw: &str) -> Result<StageOutput, PipelineError> {
    match kind {
        StageKind::Plan => {
            let payload: PlanPayload = parse_json(kind, raw)?;
            let topics = payload
                .topics
                .into_iter()
                .map(|topic| topic.trim().to_string())
                .filter(|topic| !topic.is_empty())
                .collect();
            Ok(StageOutput::Topics(topics))
        }
        StageKind::Validate => {
            let payload: VerdictPayload = parse_json(kind, raw)?;
            if !payload.score.is_finite() {
                return Err(PipelineError::MalformedOutput {
                    stage: kind,
                    message: "score is not a finite number".to_string(),
                    usage: UsageMetrics::default(),
                });
            }
            Ok(StageOutput::Verdict {
                score: payload.score,
                feedback: payload.feedback.unwrap_or_default(),
            })
        }
        StageKind::Research | StageKind::Write => Ok(StageOutput::Text(raw.to_string())),
    }
}

fn parse_json<T: DeserializeOwned>(kind: StageKind, raw: &str) -> Result<T, PipelineError> {
    let malformed = |message: String| PipelineError::MalformedOutput {
        stage: kind,
        message,
        usage: UsageMetrics::default(),
    };
    let start = raw
        .find('{')
        .ok_or_else(|| malformed("no JSON object in response".to_string()))?;
    let end = raw
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| malformed("unterminated JSON object in response".to_string()))?;
    serde_json::from_str(&raw[start..=end]).map_err(|e| malformed(e.to_string()))
}

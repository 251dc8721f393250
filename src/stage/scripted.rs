//! Scripted stage service: deterministic replies for exercising the orchestrator offline.
//!
//! Sequential stages pop replies from a queue. Research replies can also be keyed by topic,
//! with an optional delay, so fan-out completion order can be forced.

use crate::error::PipelineError;
use crate::pipeline::usage::UsageMetrics;
use crate::stage::{StageInputs, StageKind, StageOutput, StageResult, StageService};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Ok(StageResult),
    Err(String),
    /// The call succeeded and was billed, but the reply is unusable.
    Malformed(String, UsageMetrics),
}

impl Reply {
    fn into_result(self, kind: StageKind) -> Result<StageResult, PipelineError> {
        match self {
            Reply::Ok(result) => Ok(result),
            Reply::Err(message) => Err(PipelineError::ProviderRequestFailed(message)),
            Reply::Malformed(message, usage) => Err(PipelineError::MalformedOutput {
                stage: kind,
                message,
                usage,
            }),
        }
    }
}

pub struct ScriptedStage {
    kind: StageKind,
    model: String,
    queue: Mutex<VecDeque<Reply>>,
    by_topic: Mutex<HashMap<String, (Reply, Duration)>>,
    default_usage: UsageMetrics,
    delay: Duration,
    calls: Mutex<Vec<StageInputs>>,
}

impl ScriptedStage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            model: format!("scripted-{}", kind.to_string().to_lowercase()),
            queue: Mutex::new(VecDeque::new()),
            by_topic: Mutex::new(HashMap::new()),
            default_usage: UsageMetrics::total_only(1),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Usage attached to research echo replies.
    pub fn with_default_usage(mut self, usage: UsageMetrics) -> Self {
        self.default_usage = usage;
        self
    }

    /// Delay applied to every queued reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn then_ok(self, output: StageOutput, usage: UsageMetrics) -> Self {
        self.queue
            .lock()
            .push_back(Reply::Ok(StageResult { output, usage }));
        self
    }

    pub fn then_err(self, message: impl Into<String>) -> Self {
        self.queue.lock().push_back(Reply::Err(message.into()));
        self
    }

    /// Queue a reply that consumed `usage` tokens but cannot be parsed.
    pub fn then_malformed(self, message: impl Into<String>, usage: u64) -> Self {
        self.queue.lock().push_back(Reply::Malformed(
            message.into(),
            UsageMetrics::total_only(usage),
        ));
        self
    }

    pub fn then_topics(self, topics: &[&str], usage: u64) -> Self {
        let topics = topics.iter().map(|t| t.to_string()).collect();
        self.then_ok(StageOutput::Topics(topics), UsageMetrics::total_only(usage))
    }

    pub fn then_verdict(self, score: f64, feedback: &str, usage: u64) -> Self {
        self.then_ok(
            StageOutput::Verdict {
                score,
                feedback: feedback.to_string(),
            },
            UsageMetrics::total_only(usage),
        )
    }

    pub fn then_text(self, text: &str, usage: u64) -> Self {
        self.then_ok(
            StageOutput::Text(text.to_string()),
            UsageMetrics::total_only(usage),
        )
    }

    /// Reply for a specific research topic, delivered after `delay`.
    pub fn on_topic(self, topic: &str, text: &str, usage: u64, delay: Duration) -> Self {
        let reply = Reply::Ok(StageResult {
            output: StageOutput::Text(text.to_string()),
            usage: UsageMetrics::total_only(usage),
        });
        self.by_topic
            .lock()
            .insert(topic.to_string(), (reply, delay));
        self
    }

    pub fn fail_topic(self, topic: &str, message: &str) -> Self {
        self.by_topic.lock().insert(
            topic.to_string(),
            (Reply::Err(message.to_string()), Duration::ZERO),
        );
        self
    }

    pub fn calls(&self) -> Vec<StageInputs> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StageService for ScriptedStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, inputs: &StageInputs) -> Result<StageResult, PipelineError> {
        self.calls.lock().push(inputs.clone());

        if let Some(topic) = inputs.text("topic") {
            let keyed = self.by_topic.lock().get(topic).cloned();
            if let Some((reply, delay)) = keyed {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                return reply.into_result(self.kind);
            }
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.queue.lock().pop_front();
        match queued {
            Some(reply) => reply.into_result(self.kind),
            None if self.kind == StageKind::Research => Ok(StageResult {
                output: StageOutput::Text(format!(
                    "## {}\n",
                    inputs.text("topic").unwrap_or_default()
                )),
                usage: self.default_usage,
            }),
            None => Err(PipelineError::ProviderError(format!(
                "no scripted reply left for {} stage",
                self.kind
            ))),
        }
    }
}

//! Stage graph: Plan → Research → (Validate → retry?) → (Write) → Complete.
//!
//! The orchestrator owns the [`PipelineState`] for the whole run and is the only place it
//! is mutated. Research fans out through [`FanOutExecutor`]; every other stage runs
//! sequentially on the coordinating task.

use crate::error::PipelineError;
use crate::pipeline::checkpoint::ResearchCheckpoint;
use crate::pipeline::fanout::{concatenate_successes, FanOutExecutor, StageTask};
use crate::pipeline::state::PipelineState;
use crate::pipeline::usage::{add_usage, UsageMetrics};
use crate::stage::{invoke_checked, StageInputs, StageKind, StageOutput, StageService};
use crate::telemetry::{NoopSink, TelemetrySink, UsageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a failed validation does before research runs again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Keep the topic list; only research is repeated, with feedback attached.
    #[default]
    ReuseTopics,
    /// Ask Plan for a fresh topic list, with feedback attached, before researching again.
    RegenerateTopics,
}

/// Tunables of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    pub worker_limit: usize,
    pub retry_ceiling: u32,
    pub acceptance_threshold: f64,
    pub retry_policy: RetryPolicy,
    pub max_topics: usize,
    pub task_timeout: Option<Duration>,
    pub section_separator: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            worker_limit: FanOutExecutor::DEFAULT_WORKER_LIMIT,
            retry_ceiling: 2,
            acceptance_threshold: 6.0,
            retry_policy: RetryPolicy::ReuseTopics,
            max_topics: 10,
            task_timeout: None,
            section_separator: String::new(),
        }
    }
}

/// The services behind each stage. Validate and Write are optional steps of the graph.
#[derive(Clone)]
pub struct StageSet {
    plan: Arc<dyn StageService>,
    research: Arc<dyn StageService>,
    validate: Option<Arc<dyn StageService>>,
    write: Option<Arc<dyn StageService>>,
}

impl StageSet {
    pub fn new(
        plan: Arc<dyn StageService>,
        research: Arc<dyn StageService>,
    ) -> Result<Self, PipelineError> {
        expect_kind(plan.as_ref(), StageKind::Plan)?;
        expect_kind(research.as_ref(), StageKind::Research)?;
        Ok(Self {
            plan,
            research,
            validate: None,
            write: None,
        })
    }

    pub fn with_validate(mut self, validate: Arc<dyn StageService>) -> Result<Self, PipelineError> {
        expect_kind(validate.as_ref(), StageKind::Validate)?;
        self.validate = Some(validate);
        Ok(self)
    }

    pub fn with_write(mut self, write: Arc<dyn StageService>) -> Result<Self, PipelineError> {
        expect_kind(write.as_ref(), StageKind::Write)?;
        self.write = Some(write);
        Ok(self)
    }

    pub fn has_validate(&self) -> bool {
        self.validate.is_some()
    }

    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }
}

fn expect_kind(service: &dyn StageService, expected: StageKind) -> Result<(), PipelineError> {
    if service.kind() == expected {
        Ok(())
    } else {
        Err(PipelineError::ConfigError(format!(
            "{} service registered as the {} stage",
            service.kind(),
            expected
        )))
    }
}

/// States of the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Planning,
    Researching,
    Validating,
    Writing,
    Complete,
}

/// Why the run reached `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Validate scored the content above the threshold.
    Accepted,
    /// No retries left; Validate was skipped.
    RetryBudgetExhausted,
    /// Validate itself failed; existing content is returned.
    ValidationFailed,
    /// No validation stage is configured.
    Unvalidated,
    Cancelled,
}

/// A research task that contributed nothing to the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFailure {
    pub topic: String,
    pub ordinal: usize,
    pub reason: String,
}

/// Calls and summed usage for one stage kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUsage {
    pub calls: u32,
    pub usage: UsageMetrics,
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub content: String,
    pub total_usage: u64,
    pub retry_count: u32,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub topics: Vec<String>,
    pub failed_topics: Vec<TopicFailure>,
    pub completion: Completion,
    pub steps: Vec<FlowStep>,
    pub usage_by_stage: BTreeMap<StageKind, StageUsage>,
}

enum Verdict {
    Accept,
    Retry,
}

/// Mutable bookkeeping of one run, kept beside the state.
struct RunLedger {
    state: PipelineState,
    usage_by_stage: BTreeMap<StageKind, StageUsage>,
    failed_topics: Vec<TopicFailure>,
    steps: Vec<FlowStep>,
}

/// Runs the stage graph for one description.
pub struct ResearchFlow {
    stages: StageSet,
    settings: FlowSettings,
    telemetry: Arc<dyn TelemetrySink>,
    checkpoint: Option<ResearchCheckpoint>,
    cancel: Option<CancellationToken>,
}

impl ResearchFlow {
    pub fn new(stages: StageSet, settings: FlowSettings) -> Self {
        Self {
            stages,
            settings,
            telemetry: Arc::new(NoopSink),
            checkpoint: None,
            cancel: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: ResearchCheckpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn stages(&self) -> &StageSet {
        &self.stages
    }

    /// Drive the graph to `Complete`.
    ///
    /// Fails only when the initial Plan fails or a stage input contract is violated; every
    /// other failure degrades the result instead.
    pub async fn run(&self, state: PipelineState) -> Result<RunOutcome, PipelineError> {
        info!(
            description = %state.description(),
            emphasizer = %state.emphasizer(),
            datetime = %state.datetime(),
            "research flow started"
        );
        let mut ledger = RunLedger {
            state,
            usage_by_stage: BTreeMap::new(),
            failed_topics: Vec::new(),
            steps: Vec::new(),
        };

        let mut step = FlowStep::Planning;
        let mut planned = false;
        let mut completion = Completion::Unvalidated;
        loop {
            ledger.steps.push(step);
            if step == FlowStep::Complete {
                break;
            }
            if self.is_cancelled() {
                completion = Completion::Cancelled;
                step = FlowStep::Complete;
                continue;
            }
            step = match step {
                FlowStep::Planning => {
                    self.plan(&mut ledger, planned).await?;
                    planned = true;
                    FlowStep::Researching
                }
                FlowStep::Researching => {
                    let cancelled = self.research(&mut ledger).await?;
                    if cancelled {
                        completion = Completion::Cancelled;
                        FlowStep::Complete
                    } else if self.stages.has_validate() {
                        FlowStep::Validating
                    } else {
                        self.after_acceptance()
                    }
                }
                FlowStep::Validating => match self.validate(&mut ledger).await? {
                    Some(Verdict::Accept) => {
                        completion = Completion::Accepted;
                        self.after_acceptance()
                    }
                    Some(Verdict::Retry) => match self.settings.retry_policy {
                        RetryPolicy::ReuseTopics => FlowStep::Researching,
                        RetryPolicy::RegenerateTopics => FlowStep::Planning,
                    },
                    None => {
                        completion = if self.is_cancelled() {
                            Completion::Cancelled
                        } else if ledger.state.retry_count >= self.settings.retry_ceiling {
                            Completion::RetryBudgetExhausted
                        } else {
                            Completion::ValidationFailed
                        };
                        FlowStep::Complete
                    }
                },
                FlowStep::Writing => {
                    self.write(&mut ledger).await?;
                    if self.is_cancelled() {
                        completion = Completion::Cancelled;
                    }
                    FlowStep::Complete
                }
                FlowStep::Complete => FlowStep::Complete,
            };
        }

        self.telemetry.flush().await;
        let RunLedger {
            state,
            usage_by_stage,
            failed_topics,
            steps,
        } = ledger;
        info!(
            total_usage = state.total_usage,
            retry_count = state.retry_count,
            completion = ?completion,
            "research flow complete"
        );
        Ok(RunOutcome {
            content: state.content,
            total_usage: state.total_usage,
            retry_count: state.retry_count,
            score: state.score,
            feedback: state.feedback,
            topics: state.topics,
            failed_topics,
            completion,
            steps,
            usage_by_stage,
        })
    }

    fn after_acceptance(&self) -> FlowStep {
        if self.stages.has_write() {
            FlowStep::Writing
        } else {
            FlowStep::Complete
        }
    }

    /// The first Plan is mandatory; a re-plan on retry that fails keeps the previous topics.
    async fn plan(&self, ledger: &mut RunLedger, replanning: bool) -> Result<(), PipelineError> {
        let service = self.stages.plan.as_ref();
        let inputs = ledger.state.plan_inputs();
        let outcome = self
            .invoke_recorded(ledger, service, &inputs)
            .await
            .and_then(|output| output.into_topics(StageKind::Plan));

        let mut topics = match outcome {
            Ok(topics) => topics,
            Err(err) if err.is_fatal() => return Err(err),
            // The run loop sees the token and completes as cancelled.
            Err(PipelineError::Cancelled) => return Ok(()),
            Err(err) if replanning => {
                warn!(error = %err, "re-plan failed; keeping previous topics");
                return Ok(());
            }
            Err(err) => return Err(PipelineError::PlanFailure(err.to_string())),
        };

        if topics.is_empty() {
            if replanning {
                warn!("re-plan returned no topics; keeping previous topics");
                return Ok(());
            }
            return Err(PipelineError::PlanFailure(
                "plan returned no topics".to_string(),
            ));
        }
        if topics.len() > self.settings.max_topics {
            warn!(
                planned = topics.len(),
                max_topics = self.settings.max_topics,
                "plan returned too many topics; truncating"
            );
            topics.truncate(self.settings.max_topics);
        }
        info!(topics = topics.len(), total_usage = ledger.state.total_usage, "plan generated");
        ledger.state.topics = topics;
        Ok(())
    }

    /// One research pass over the current topics. Returns whether the pass was cancelled.
    async fn research(&self, ledger: &mut RunLedger) -> Result<bool, PipelineError> {
        let service = self.stages.research.as_ref();
        let executor = FanOutExecutor::new(self.settings.worker_limit)
            .with_task_timeout(self.settings.task_timeout)
            .with_cancellation(self.cancel.clone());
        let tasks = StageTask::from_topics(&ledger.state.topics);
        let done = executor
            .run_all(tasks, service, &ledger.state.research_snapshot())
            .await?;

        let mut cancelled = false;
        for task in &done {
            if let Some(usage) = task.usage() {
                self.record(ledger, service, usage);
            }
            if let Some(err) = task.failure() {
                cancelled |= matches!(err, PipelineError::Cancelled);
                ledger.failed_topics.push(TopicFailure {
                    topic: task.topic.clone(),
                    ordinal: task.ordinal,
                    reason: err.to_string(),
                });
            }
        }

        ledger.state.content = concatenate_successes(&done, &self.settings.section_separator);
        info!(
            sections = done.iter().filter(|t| t.text().is_some()).count(),
            failed = done.iter().filter(|t| t.text().is_none()).count(),
            total_usage = ledger.state.total_usage,
            "research pass complete"
        );
        debug!(content = %ledger.state.content, "consolidated research draft");

        if let Some(checkpoint) = &self.checkpoint {
            if let Err(err) = checkpoint.save(&ledger.state.content) {
                warn!(error = %err, "failed to save research checkpoint");
            }
        }
        Ok(cancelled)
    }

    /// `None` means the run must complete now: retry budget spent or Validate failed.
    async fn validate(&self, ledger: &mut RunLedger) -> Result<Option<Verdict>, PipelineError> {
        let Some(service) = self.stages.validate.as_deref() else {
            return Ok(Some(Verdict::Accept));
        };
        // A validation increments retry_count; skip it when that would pass the ceiling.
        if ledger.state.retry_count + 1 > self.settings.retry_ceiling {
            info!(
                retry_count = ledger.state.retry_count,
                retry_ceiling = self.settings.retry_ceiling,
                "max retry limit reached"
            );
            return Ok(None);
        }

        let inputs = ledger.state.review_inputs();
        let outcome = self
            .invoke_recorded(ledger, service, &inputs)
            .await
            .and_then(|output| output.into_verdict(StageKind::Validate));
        let (score, feedback) = match outcome {
            Ok(validated) => validated,
            Err(err) if err.is_fatal() => return Err(err),
            Err(PipelineError::Cancelled) => return Ok(None),
            Err(err) => {
                let err = PipelineError::ValidationFailure(err.to_string());
                warn!(error = %err, "completing with unvalidated content");
                return Ok(None);
            }
        };

        ledger.state.score = Some(score);
        ledger.state.feedback = Some(feedback);
        ledger.state.retry_count += 1;
        info!(
            score,
            feedback = ?ledger.state.feedback,
            retry_count = ledger.state.retry_count,
            total_usage = ledger.state.total_usage,
            "content validated"
        );

        if score > self.settings.acceptance_threshold {
            Ok(Some(Verdict::Accept))
        } else {
            Ok(Some(Verdict::Retry))
        }
    }

    /// Best effort: a failed Write leaves the researched content in place.
    async fn write(&self, ledger: &mut RunLedger) -> Result<(), PipelineError> {
        let Some(service) = self.stages.write.as_deref() else {
            return Ok(());
        };
        let inputs = ledger.state.review_inputs();
        let outcome = self
            .invoke_recorded(ledger, service, &inputs)
            .await
            .and_then(|output| output.into_text(StageKind::Write));
        match outcome {
            Ok(text) => {
                ledger.state.content = text;
                info!(total_usage = ledger.state.total_usage, "final output written");
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(PipelineError::Cancelled) => {
                warn!("write cancelled; keeping researched content");
                Ok(())
            }
            Err(err) => {
                let err = PipelineError::WriteFailure(err.to_string());
                warn!(error = %err, "keeping researched content");
                Ok(())
            }
        }
    }

    /// Invoke a sequential stage, racing it against cancellation, and record whatever usage
    /// the call reports, including calls whose reply could not be used.
    async fn invoke_recorded(
        &self,
        ledger: &mut RunLedger,
        service: &dyn StageService,
        inputs: &StageInputs,
    ) -> Result<StageOutput, PipelineError> {
        let call = invoke_checked(service, inputs);
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(PipelineError::Cancelled),
                outcome = call => outcome,
            },
            None => call.await,
        };
        match outcome {
            Ok(result) => {
                self.record(ledger, service, &result.usage);
                Ok(result.output)
            }
            Err(err) => {
                if let Some(usage) = err.spent_usage() {
                    self.record(ledger, service, usage);
                }
                Err(err)
            }
        }
    }

    /// Single accumulation point for usage: state total, per-stage summary, telemetry.
    fn record(&self, ledger: &mut RunLedger, service: &dyn StageService, usage: &UsageMetrics) {
        add_usage(&mut ledger.state, usage);
        let entry = ledger.usage_by_stage.entry(service.kind()).or_default();
        entry.calls += 1;
        entry.usage.merge(usage);
        self.telemetry
            .record(UsageRecord::new(service.kind(), service.model_name(), usage));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

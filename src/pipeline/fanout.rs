//! Fan-out executor: runs one research call per topic with bounded concurrency.
//! Collects every outcome; a failing task never cancels its siblings or aborts the batch.

use crate::error::PipelineError;
use crate::pipeline::usage::UsageMetrics;
use crate::stage::{StageInputs, StageKind, StageService};
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Terminal (or not yet started) state of one fan-out unit.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Pending,
    Succeeded { text: String, usage: UsageMetrics },
    /// `usage` is set when the call completed but its reply was unusable.
    Failed {
        message: String,
        usage: Option<UsageMetrics>,
    },
    TimedOut(Duration),
    Cancelled,
}

impl TaskResult {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskResult::Pending)
    }
}

/// One topic to research, tagged with its position in the topic list.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTask {
    pub topic: String,
    pub ordinal: usize,
    pub result: TaskResult,
}

impl StageTask {
    pub fn new(topic: impl Into<String>, ordinal: usize) -> Self {
        Self {
            topic: topic.into(),
            ordinal,
            result: TaskResult::Pending,
        }
    }

    /// One task per topic, ordinals following topic order.
    pub fn from_topics(topics: &[String]) -> Vec<StageTask> {
        topics
            .iter()
            .enumerate()
            .map(|(ordinal, topic)| StageTask::new(topic.clone(), ordinal))
            .collect()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.result {
            TaskResult::Succeeded { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Usage the task consumed, whether or not it produced text.
    pub fn usage(&self) -> Option<&UsageMetrics> {
        match &self.result {
            TaskResult::Succeeded { usage, .. } => Some(usage),
            TaskResult::Failed { usage, .. } => usage.as_ref(),
            _ => None,
        }
    }

    /// Why the task contributed nothing; `None` on success.
    pub fn failure(&self) -> Option<PipelineError> {
        let message = match &self.result {
            TaskResult::Succeeded { .. } => return None,
            TaskResult::TimedOut(after) => return Some(PipelineError::TimedOut(*after)),
            TaskResult::Cancelled => return Some(PipelineError::Cancelled),
            TaskResult::Failed { message, .. } => message.clone(),
            TaskResult::Pending => "never ran".to_string(),
        };
        Some(PipelineError::ResearchTaskFailure {
            topic: self.topic.clone(),
            message,
        })
    }
}

/// Successful task texts joined in ordinal order. Failed, timed-out and cancelled tasks
/// contribute nothing.
pub fn concatenate_successes(tasks: &[StageTask], separator: &str) -> String {
    let mut ordered: Vec<&StageTask> = tasks.iter().collect();
    ordered.sort_by_key(|task| task.ordinal);
    ordered
        .into_iter()
        .filter_map(StageTask::text)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Runs research tasks concurrently, at most `limit` in flight.
pub struct FanOutExecutor {
    limit: usize,
    task_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl FanOutExecutor {
    pub const DEFAULT_WORKER_LIMIT: usize = 10;

    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            task_timeout: None,
            cancel: None,
        }
    }

    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Run every task against `worker` and return them all, sorted by ordinal, each in a
    /// terminal state.
    ///
    /// `shared` carries the inputs common to all tasks; each task adds its `topic`. The input
    /// contract is checked for every task before anything is dispatched.
    pub async fn run_all(
        &self,
        mut tasks: Vec<StageTask>,
        worker: &dyn StageService,
        shared: &StageInputs,
    ) -> Result<Vec<StageTask>, PipelineError> {
        let inputs = tasks
            .iter()
            .map(|task| {
                let mut inputs = shared.clone();
                inputs.insert("topic", task.topic.as_str());
                inputs.check(StageKind::Research)?;
                Ok(inputs)
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let mut in_flight = FuturesUnordered::new();
        let mut next = 0usize;
        loop {
            while in_flight.len() < self.limit && next < tasks.len() {
                let index = next;
                next += 1;
                if self.is_cancelled() {
                    tasks[index].result = TaskResult::Cancelled;
                    continue;
                }
                debug!(topic = %tasks[index].topic, ordinal = tasks[index].ordinal, "research task dispatched");
                let task_inputs = &inputs[index];
                in_flight.push(async move { (index, self.run_one(worker, task_inputs).await) });
            }

            let Some((index, result)) = in_flight.next().await else {
                break;
            };
            let task = &mut tasks[index];
            match &result {
                TaskResult::Succeeded { usage, .. } => {
                    debug!(topic = %task.topic, ordinal = task.ordinal, tokens = usage.total, "research task completed");
                }
                TaskResult::Failed { message, .. } => {
                    warn!(topic = %task.topic, ordinal = task.ordinal, error = %message, "research task failed");
                }
                TaskResult::TimedOut(after) => {
                    warn!(topic = %task.topic, ordinal = task.ordinal, timeout = ?after, "research task timed out");
                }
                TaskResult::Cancelled => {
                    debug!(topic = %task.topic, ordinal = task.ordinal, "research task cancelled");
                }
                TaskResult::Pending => {}
            }
            task.result = result;
        }

        tasks.sort_by_key(|task| task.ordinal);
        Ok(tasks)
    }

    async fn run_one(&self, worker: &dyn StageService, inputs: &StageInputs) -> TaskResult {
        let call = async {
            let outcome = match self.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, worker.invoke(inputs)).await {
                    Ok(outcome) => outcome,
                    Err(_) => return TaskResult::TimedOut(limit),
                },
                None => worker.invoke(inputs).await,
            };
            match outcome {
                Ok(result) => match result.output.into_text(StageKind::Research) {
                    Ok(text) => TaskResult::Succeeded {
                        text,
                        usage: result.usage,
                    },
                    Err(err) => TaskResult::Failed {
                        message: err.to_string(),
                        usage: Some(result.usage),
                    },
                },
                Err(err) => TaskResult::Failed {
                    message: err.to_string(),
                    usage: err.spent_usage().copied(),
                },
            }
        };

        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => TaskResult::Cancelled,
                result = call => result,
            },
            None => call.await,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

impl Default for FanOutExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WORKER_LIMIT)
    }
}

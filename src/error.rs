//! Error types for the deepflow content generation pipeline.

use crate::pipeline::usage::UsageMetrics;
use crate::stage::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// Checkpoint and file storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to write {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Pipeline-level errors.
///
/// Only `PlanFailure` and `InputContractViolation` abort a run; the other stage
/// kinds are recovered by the orchestrator and surface in logs and the run outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Plan generation failed: {0}")]
    PlanFailure(String),

    #[error("Research failed for topic '{topic}': {message}")]
    ResearchTaskFailure { topic: String, message: String },

    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    #[error("Write failed: {0}")]
    WriteFailure(String),

    #[error("{stage} stage is missing required inputs: {}", missing.join(", "))]
    InputContractViolation {
        stage: StageKind,
        missing: Vec<String>,
    },

    /// The call completed and consumed `usage`, but its reply could not be used.
    #[error("Malformed {stage} output: {message}")]
    MalformedOutput {
        stage: StageKind,
        message: String,
        usage: UsageMetrics,
    },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Stage call timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Errors that stop a run instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::PlanFailure(_) | PipelineError::InputContractViolation { .. }
        )
    }

    /// Usage consumed by a call that still failed.
    pub fn spent_usage(&self) -> Option<&UsageMetrics> {
        match self {
            PipelineError::MalformedOutput { usage, .. } => Some(usage),
            _ => None,
        }
    }

    /// Attach the usage of the call that produced this error.
    pub fn with_spent_usage(self, spent: UsageMetrics) -> Self {
        match self {
            PipelineError::MalformedOutput { stage, message, .. } => {
                PipelineError::MalformedOutput {
                    stage,
                    message,
                    usage: spent,
                }
            }
            other => other,
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

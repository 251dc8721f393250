//! Configuration System
//!
//! Layered configuration for the pipeline: built-in defaults, the user's global file, the
//! workspace files, then `DEEPFLOW__SECTION__KEY` environment overrides. Credentials are
//! never stored in config; config names the environment variables that hold them.

use crate::error::PipelineError;
use crate::logging::LoggingConfig;
use crate::pipeline::checkpoint::DEFAULT_CHECKPOINT_FILE;
use crate::pipeline::orchestrator::{FlowSettings, RetryPolicy};
use crate::provider::{CompletionOptions, ModelProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepflowConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Optional stages of the graph
    #[serde(default)]
    pub stages: StagesConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestrator tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrent research calls
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Maximum validate-triggered re-entries into research
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Scores strictly above this are accepted
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Plan output is truncated to this many topics
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Per research call timeout, unbounded when unset
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    /// Inserted between research sections
    #[serde(default)]
    pub section_separator: String,

    /// Research checkpoint file, relative to the workspace root
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Temporal context tag; defaults to the current year
    #[serde(default)]
    pub datetime: Option<String>,
}

fn default_worker_limit() -> usize {
    10
}

fn default_retry_ceiling() -> u32 {
    2
}

fn default_acceptance_threshold() -> f64 {
    6.0
}

fn default_max_topics() -> usize {
    10
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_FILE)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            retry_ceiling: default_retry_ceiling(),
            acceptance_threshold: default_acceptance_threshold(),
            retry_policy: RetryPolicy::default(),
            max_topics: default_max_topics(),
            task_timeout_secs: None,
            section_separator: String::new(),
            output_path: default_output_path(),
            datetime: None,
        }
    }
}

impl PipelineConfig {
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            worker_limit: self.worker_limit,
            retry_ceiling: self.retry_ceiling,
            acceptance_threshold: self.acceptance_threshold,
            retry_policy: self.retry_policy,
            max_topics: self.max_topics,
            task_timeout: self.task_timeout_secs.map(Duration::from_secs),
            section_separator: self.section_separator.clone(),
        }
    }

    pub fn resolved_datetime(&self) -> String {
        self.datetime
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("%Y").to_string())
    }

    /// Checkpoint path; relative paths resolve against `workspace_root`.
    pub fn checkpoint_path(&self, workspace_root: &Path) -> PathBuf {
        if self.output_path.is_absolute() {
            self.output_path.clone()
        } else {
            workspace_root.join(&self.output_path)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_limit == 0 {
            return Err("worker_limit must be at least 1".to_string());
        }
        if self.max_topics == 0 {
            return Err("max_topics must be at least 1".to_string());
        }
        if !self.acceptance_threshold.is_finite() {
            return Err("acceptance_threshold must be a finite number".to_string());
        }
        if self.task_timeout_secs == Some(0) {
            return Err("task_timeout_secs must be positive when set".to_string());
        }
        if self.output_path.as_os_str().is_empty() {
            return Err("output_path cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Optional stages. Both are off by default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub write: bool,
}

/// Supported provider backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    #[default]
    OpenRouter,
    Ollama,
    Local,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint override; required for `local`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_model() -> String {
    "deepseek/deepseek-chat".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENROUTER_API_KEY".to_string())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model cannot be empty".to_string());
        }
        if self.kind == ProviderKind::Local && self.base_url.is_none() {
            return Err("local provider requires base_url".to_string());
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("base_url must be an http(s) URL, got '{}'", url));
            }
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("temperature must be between 0.0 and 2.0".to_string());
            }
        }
        Ok(())
    }

    fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }

    fn require_api_key(&self) -> Result<String, PipelineError> {
        self.api_key().ok_or_else(|| {
            PipelineError::ConfigError(format!(
                "API key not found; set {}",
                self.api_key_env.as_deref().unwrap_or("provider.api_key_env")
            ))
        })
    }

    /// Resolve credentials from the environment and build the provider description.
    pub fn to_model_provider(&self) -> Result<ModelProvider, PipelineError> {
        let model = self.model.clone();
        Ok(match self.kind {
            ProviderKind::OpenAI => ModelProvider::OpenAI {
                model,
                api_key: self.require_api_key()?,
                base_url: self.base_url.clone(),
            },
            ProviderKind::OpenRouter => match &self.base_url {
                Some(base_url) => ModelProvider::OpenAI {
                    model,
                    api_key: self.require_api_key()?,
                    base_url: Some(base_url.clone()),
                },
                None => ModelProvider::OpenRouter {
                    model,
                    api_key: self.require_api_key()?,
                },
            },
            ProviderKind::Ollama => ModelProvider::Ollama {
                model,
                base_url: self.base_url.clone(),
            },
            ProviderKind::Local => ModelProvider::LocalCustom {
                model,
                endpoint: self.base_url.clone().ok_or_else(|| {
                    PipelineError::ConfigError("local provider requires base_url".to_string())
                })?,
                api_key: self.api_key(),
            },
        })
    }

    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature.or(CompletionOptions::default().temperature),
            max_tokens: self.max_tokens,
            ..CompletionOptions::default()
        }
    }
}

/// Telemetry sink selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    None,
    #[default]
    Log,
    Collector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub sink: SinkKind,

    /// Collector base URL
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_public_key_env")]
    pub public_key_env: String,

    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
}

fn default_public_key_env() -> String {
    "LANGFUSE_PUBLIC_KEY".to_string()
}

fn default_secret_key_env() -> String {
    "LANGFUSE_SECRET_KEY".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            host: None,
            public_key_env: default_public_key_env(),
            secret_key_env: default_secret_key_env(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sink == SinkKind::Collector && self.host.is_none() {
            return Err("collector sink requires host".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Pipeline(String),
    Provider(String),
    Telemetry(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Telemetry(msg) => write!(f, "Telemetry: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl DeepflowConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = self.pipeline.validate() {
            errors.push(ValidationError::Pipeline(e));
        }
        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if let Err(e) = self.telemetry.validate() {
            errors.push(ValidationError::Telemetry(e));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into one `ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), PipelineError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }
}

//! CLI route: single route table and run context.

use crate::cli::parse::{Commands, RunArgs};
use crate::cli::presentation::{format_outcome_summary, format_usage_table};
use crate::config::{ConfigLoader, DeepflowConfig};
use crate::error::PipelineError;
use crate::pipeline::graph::{render_mermaid, GraphShape};
use crate::pipeline::{build_flow, PipelineState};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runtime context for CLI execution: workspace root and loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: DeepflowConfig,
    cancel: CancellationToken,
}

impl RunContext {
    /// Load configuration from `config_path` if given, otherwise from the workspace layers.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self::from_config(workspace_root, config))
    }

    pub fn from_config(workspace_root: PathBuf, config: DeepflowConfig) -> Self {
        Self {
            workspace_root,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops an in-flight run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &DeepflowConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Run(args) => self.handle_run(args).await,
            Commands::Graph => Ok(render_mermaid(GraphShape {
                validate: self.config.stages.validate,
                write: self.config.stages.write,
                retry_policy: self.config.pipeline.retry_policy,
            })),
            Commands::Config => {
                let rendered = toml::to_string_pretty(&self.config).map_err(|e| {
                    PipelineError::ConfigError(format!("Failed to render configuration: {}", e))
                })?;
                Ok(match ConfigLoader::global_config_path() {
                    Some(path) => format!("# global config: {}\n{}", path.display(), rendered),
                    None => rendered,
                })
            }
        }
    }

    async fn handle_run(&self, args: &RunArgs) -> Result<String, PipelineError> {
        let config = apply_run_overrides(self.config.clone(), args);
        let flow = build_flow(&config, &self.workspace_root)?
            .with_cancellation(self.cancel.clone());

        let datetime = args
            .datetime
            .clone()
            .unwrap_or_else(|| config.pipeline.resolved_datetime());
        let state = PipelineState::new(args.description(), args.emphasizer(), datetime);
        let outcome = flow.run(state).await?;
        info!(
            completion = ?outcome.completion,
            total_usage = outcome.total_usage,
            "run finished"
        );

        Ok(format!(
            "{}\n\n{}\n{}",
            outcome.content.trim_end(),
            format_outcome_summary(&outcome),
            format_usage_table(&outcome)
        ))
    }
}

/// Fold `run` flags over the loaded configuration.
pub fn apply_run_overrides(mut config: DeepflowConfig, args: &RunArgs) -> DeepflowConfig {
    if let Some(workers) = args.workers {
        config.pipeline.worker_limit = workers;
    }
    if let Some(ceiling) = args.retry_ceiling {
        config.pipeline.retry_ceiling = ceiling;
    }
    if let Some(threshold) = args.threshold {
        config.pipeline.acceptance_threshold = threshold;
    }
    if args.validate {
        config.stages.validate = true;
    }
    if args.write {
        config.stages.write = true;
    }
    if let Some(ref output) = args.output {
        config.pipeline.output_path = output.clone();
    }
    if args.datetime.is_some() {
        config.pipeline.datetime = args.datetime.clone();
    }
    config
}

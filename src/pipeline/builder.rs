//! Assemble a [`ResearchFlow`] from configuration.

use crate::config::{DeepflowConfig, SinkKind, TelemetryConfig};
use crate::error::PipelineError;
use crate::pipeline::checkpoint::ResearchCheckpoint;
use crate::pipeline::orchestrator::{ResearchFlow, StageSet};
use crate::provider::{ModelProviderClient, ProviderFactory};
use crate::stage::{LlmStage, StageKind, StageService};
use crate::telemetry::{CollectorSettings, CollectorSink, LogSink, NoopSink, TelemetrySink};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Build the flow described by `config`.
///
/// All stages share one provider client. Must be called inside a tokio runtime when the
/// collector sink is configured.
pub fn build_flow(
    config: &DeepflowConfig,
    workspace_root: &Path,
) -> Result<ResearchFlow, PipelineError> {
    config.ensure_valid()?;

    let provider = config.provider.to_model_provider()?;
    let client: Arc<dyn ModelProviderClient> = Arc::from(ProviderFactory::create_client(&provider)?);
    let options = config.provider.completion_options();
    let stage = |kind: StageKind| -> Arc<dyn StageService> {
        Arc::new(LlmStage::new(kind, client.clone(), options.clone()))
    };

    let mut stages = StageSet::new(stage(StageKind::Plan), stage(StageKind::Research))?;
    if config.stages.validate {
        stages = stages.with_validate(stage(StageKind::Validate))?;
    }
    if config.stages.write {
        stages = stages.with_write(stage(StageKind::Write))?;
    }

    let checkpoint = ResearchCheckpoint::new(config.pipeline.checkpoint_path(workspace_root));
    info!(
        provider = %client.provider_name(),
        model = %client.model_name(),
        validate = config.stages.validate,
        write = config.stages.write,
        checkpoint = %checkpoint.path().display(),
        "research flow assembled"
    );

    Ok(ResearchFlow::new(stages, config.pipeline.flow_settings())
        .with_telemetry(build_sink(&config.telemetry)?)
        .with_checkpoint(checkpoint))
}

/// Telemetry sink selected by config. Missing collector credentials fall back to the log sink.
pub fn build_sink(telemetry: &TelemetryConfig) -> Result<Arc<dyn TelemetrySink>, PipelineError> {
    Ok(match telemetry.sink {
        SinkKind::None => Arc::new(NoopSink),
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Collector => {
            let host = telemetry.host.clone().ok_or_else(|| {
                PipelineError::ConfigError("collector sink requires telemetry.host".to_string())
            })?;
            let public_key = std::env::var(&telemetry.public_key_env).ok();
            let secret_key = std::env::var(&telemetry.secret_key_env).ok();
            match (public_key, secret_key) {
                (Some(public_key), Some(secret_key)) => Arc::new(CollectorSink::spawn(
                    CollectorSettings::new(host, public_key, secret_key),
                )?),
                _ => {
                    tracing::warn!(
                        public_key_env = %telemetry.public_key_env,
                        secret_key_env = %telemetry.secret_key_env,
                        "collector credentials not set, logging usage instead"
                    );
                    Arc::new(LogSink)
                }
            }
        }
    })
}

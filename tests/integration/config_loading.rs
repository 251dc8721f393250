//! Layered configuration loading: defaults, global file, workspace files, environment.

use deepflow::config::{ConfigLoader, ProviderKind, SinkKind};
use deepflow::pipeline::RetryPolicy;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::integration::with_isolated_env;

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn empty_workspace_yields_defaults() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("ws");
    fs::create_dir_all(&workspace).unwrap();

    let config = with_isolated_env(&test_dir, &[], || ConfigLoader::load(&workspace)).unwrap();

    assert_eq!(config.pipeline.worker_limit, 10);
    assert_eq!(config.pipeline.retry_ceiling, 2);
    assert_eq!(config.pipeline.acceptance_threshold, 6.0);
    assert!(!config.stages.validate);
    assert_eq!(config.provider.kind, ProviderKind::OpenRouter);
    assert_eq!(config.telemetry.sink, SinkKind::Log);
}

#[test]
fn workspace_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("ws");
    write_file(
        &test_dir.path().join("xdg/deepflow/config.toml"),
        r#"
[pipeline]
worker_limit = 3
retry_ceiling = 5

[provider]
kind = "ollama"
model = "llama3"
"#,
    );
    write_file(
        &workspace.join("config/config.toml"),
        r#"
[pipeline]
worker_limit = 6
retry_policy = "regenerate_topics"

[stages]
validate = true
"#,
    );

    let config = with_isolated_env(&test_dir, &[], || ConfigLoader::load(&workspace)).unwrap();

    assert_eq!(config.pipeline.worker_limit, 6);
    assert_eq!(config.pipeline.retry_ceiling, 5);
    assert_eq!(config.pipeline.retry_policy, RetryPolicy::RegenerateTopics);
    assert!(config.stages.validate);
    assert_eq!(config.provider.kind, ProviderKind::Ollama);
    assert_eq!(config.provider.model, "llama3");
}

#[test]
fn environment_file_and_variables_layer_on_top() {
    let test_dir = TempDir::new().unwrap();
    let workspace = test_dir.path().join("ws");
    write_file(
        &workspace.join("config/config.toml"),
        "[pipeline]\nacceptance_threshold = 5.0\n",
    );
    write_file(
        &workspace.join("config/staging.toml"),
        "[pipeline]\nacceptance_threshold = 7.5\n\n[stages]\nwrite = true\n",
    );

    let config = with_isolated_env(
        &test_dir,
        &[
            ("DEEPFLOW_ENV", "staging"),
            ("DEEPFLOW__PIPELINE__WORKER_LIMIT", "4"),
        ],
        || ConfigLoader::load(&workspace),
    )
    .unwrap();

    assert_eq!(config.pipeline.acceptance_threshold, 7.5);
    assert!(config.stages.write);
    assert_eq!(config.pipeline.worker_limit, 4);
}

#[test]
fn load_from_file_reads_explicit_path() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("custom.toml");
    write_file(
        &config_file,
        r#"
[pipeline]
max_topics = 4
task_timeout_secs = 90
output_path = "drafts/out.md"

[telemetry]
sink = "collector"
host = "https://collector.example"
"#,
    );

    let config =
        with_isolated_env(&test_dir, &[], || ConfigLoader::load_from_file(&config_file)).unwrap();

    assert_eq!(config.pipeline.max_topics, 4);
    assert_eq!(config.pipeline.task_timeout_secs, Some(90));
    assert_eq!(config.telemetry.sink, SinkKind::Collector);
    assert!(config.validate().is_ok());
    assert_eq!(
        config.pipeline.checkpoint_path(Path::new("/ws")),
        Path::new("/ws/drafts/out.md")
    );
}

#[test]
fn missing_explicit_file_is_an_error() {
    let test_dir = TempDir::new().unwrap();
    let result = ConfigLoader::load_from_file(&test_dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn global_path_follows_xdg_config_home() {
    let test_dir = TempDir::new().unwrap();
    let path = with_isolated_env(&test_dir, &[], ConfigLoader::global_config_path).unwrap();
    assert_eq!(path, test_dir.path().join("xdg/deepflow/config.toml"));
}

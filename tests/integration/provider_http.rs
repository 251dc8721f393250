//! Provider client and LLM stages against a mock OpenAI-compatible server.

use deepflow::config::{DeepflowConfig, ProviderKind, SinkKind};
use deepflow::pipeline::{build_flow, Completion};
use deepflow::provider::{
    ChatMessage, CompletionOptions, ModelProviderClient, OpenAICompatibleClient,
};
use deepflow::stage::{LlmStage, StageInputs, StageKind, StageOutput, StageService};
use deepflow::PipelineError;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::integration::initial_state;

fn completion_body(content: &str, total: u64) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "mock-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": total - 1,
            "completion_tokens": 1,
            "total_tokens": total,
            "prompt_tokens_details": {"cached_tokens": 0}
        }
    })
}

fn client(server: &MockServer, api_key: Option<&str>) -> OpenAICompatibleClient {
    OpenAICompatibleClient::new(
        "local",
        "mock-model".to_string(),
        api_key.map(str::to_string),
        format!("{}/v1", server.uri()),
    )
    .unwrap()
}

#[tokio::test]
async fn completion_reports_content_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hello", 42)))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server, Some("secret"))
        .complete(vec![ChatMessage::user("hi")], CompletionOptions::default())
        .await
        .unwrap();

    assert_eq!(response.content, "hello");
    assert_eq!(response.usage.total_tokens, 42);
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn http_status_maps_to_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = client(&server, Some("wrong"))
        .complete(vec![ChatMessage::user("hi")], CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProviderAuthFailed(_)));

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    let err = client(&server, None)
        .complete(vec![ChatMessage::user("hi")], CompletionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ProviderRateLimit(_)));
}

#[tokio::test]
async fn validate_stage_parses_verdict_from_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("demanding editor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "```json\n{\"score\": 7.5, \"feedback\": \"cite sources\"}\n```",
            9,
        )))
        .mount(&server)
        .await;

    let stage = LlmStage::new(
        StageKind::Validate,
        Arc::new(client(&server, None)),
        CompletionOptions::default(),
    );
    let inputs = StageInputs::new()
        .with("content", "## Draft\n")
        .with("description", "an article");
    let result = stage.invoke(&inputs).await.unwrap();

    assert_eq!(
        result.output,
        StageOutput::Verdict {
            score: 7.5,
            feedback: "cite sources".to_string()
        }
    );
    assert_eq!(result.usage.total, 9);
}

#[tokio::test]
async fn configured_flow_runs_against_local_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("research planner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            r#"{"topics": ["Alpha", "Beta"]}"#,
            10,
        )))
        .mount(&server)
        .await;
    for (topic, total) in [("Alpha", 100), ("Beta", 200)] {
        Mock::given(method("POST"))
            .and(body_string_contains("senior researcher"))
            .and(body_string_contains(format!("**{}**", topic)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body(&format!("## {}\n", topic), total)),
            )
            .mount(&server)
            .await;
    }

    let workspace = TempDir::new().unwrap();
    let mut config = DeepflowConfig::default();
    config.provider.kind = ProviderKind::Local;
    config.provider.base_url = Some(format!("{}/v1", server.uri()));
    config.provider.api_key_env = None;
    config.telemetry.sink = SinkKind::None;

    let flow = build_flow(&config, workspace.path()).unwrap();
    let outcome = flow.run(initial_state()).await.unwrap();

    assert_eq!(outcome.content, "## Alpha\n## Beta\n");
    assert_eq!(outcome.total_usage, 310);
    assert_eq!(outcome.completion, Completion::Unvalidated);
    let saved = std::fs::read_to_string(workspace.path().join("research_output.md")).unwrap();
    assert_eq!(saved, outcome.content);
}

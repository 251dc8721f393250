//! Model Provider Abstraction
//!
//! Chat-completion clients behind a single trait. Every supported backend speaks the
//! OpenAI-compatible `/chat/completions` dialect (OpenAI, OpenRouter, Ollama's `/v1`
//! endpoint, custom local servers), so one HTTP client covers them all.

use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelProvider {
    OpenAI {
        model: String,
        api_key: String,
        base_url: Option<String>, // For custom endpoints (e.g., Azure OpenAI)
    },
    OpenRouter {
        model: String,
        api_key: String,
    },
    Ollama {
        model: String,
        base_url: Option<String>,
    },
    LocalCustom {
        model: String,
        endpoint: String, // Full endpoint URL (e.g., http://localhost:8080/v1)
        api_key: Option<String>,
    },
}

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>, // 0.0-2.0, default: 1.0
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(1.0),
            max_tokens: None,
            top_p: None,
            stop: None,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub total_tokens: u64,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        let cached = usage
            .prompt_tokens_details
            .map(|details| details.cached_tokens)
            .unwrap_or(0);
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cached_prompt_tokens: cached,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
        }
    }
}

fn role_to_string(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
    }
}

fn map_http_error(error: reqwest::Error) -> PipelineError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        PipelineError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        PipelineError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        PipelineError::ProviderError(format!("HTTP error: {}", error))
    }
}

fn map_status(status: u16, detail: String) -> PipelineError {
    match status {
        401 => PipelineError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => PipelineError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        404 => PipelineError::ProviderModelNotFound(format!("Model not found: {}", detail)),
        _ => PipelineError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Research calls browse and summarize; they routinely run for minutes.
const PROVIDER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

fn build_provider_http_client() -> Result<Client, PipelineError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(PROVIDER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Client for any OpenAI-compatible chat-completion endpoint.
pub struct OpenAICompatibleClient {
    client: Client,
    provider: &'static str,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAICompatibleClient {
    pub fn new(
        provider: &'static str,
        model: String,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, PipelineError> {
        let client = build_provider_http_client()?;
        Ok(Self {
            client,
            provider,
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelProviderClient for OpenAICompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, PipelineError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|msg| OpenAIMessage {
                    role: role_to_string(msg.role).to_string(),
                    content: Some(msg.content),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: options.stop,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status.as_u16(), error_text));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            PipelineError::ProviderError(format!("Failed to parse response: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::ProviderError("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            usage: completion.usage.map(TokenUsage::from).unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    fn provider_name(&self) -> &str {
        self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Provider factory
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        provider: &ModelProvider,
    ) -> Result<Box<dyn ModelProviderClient>, PipelineError> {
        let client = match provider {
            ModelProvider::OpenAI {
                model,
                api_key,
                base_url,
            } => OpenAICompatibleClient::new(
                "openai",
                model.clone(),
                Some(api_key.clone()),
                base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            )?,
            ModelProvider::OpenRouter { model, api_key } => OpenAICompatibleClient::new(
                "openrouter",
                model.clone(),
                Some(api_key.clone()),
                OPENROUTER_BASE_URL.to_string(),
            )?,
            ModelProvider::Ollama { model, base_url } => OpenAICompatibleClient::new(
                "ollama",
                model.clone(),
                None,
                base_url
                    .clone()
                    .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            )?,
            ModelProvider::LocalCustom {
                model,
                endpoint,
                api_key,
            } => OpenAICompatibleClient::new(
                "local",
                model.clone(),
                api_key.clone(),
                endpoint.clone(),
            )?,
        };
        Ok(Box::new(client))
    }
}

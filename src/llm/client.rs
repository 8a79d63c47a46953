//! OpenAI-compatible LLM client.
//!
//! This client works with any OpenAI-compatible API endpoint,
//! including self-hosted proxies.

use crate::config::LlmConfig;
use crate::error::{PageIndexError, Result};
use crate::llm::generator::{GenerationRequest, ResponseFormat, TextGenerator};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from an LLM call including metadata.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Reason the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage (if available).
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not apply request timeout, using default client");
                Client::new()
            });
        Self { client, config }
    }

    /// The model identifier every request is sent with.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let request = self.completion_request(messages, None, ResponseFormat::Text);
        self.send(request).await
    }

    /// Body for one completion. JSON answers are requested at temperature 0
    /// so structured output stays stable across retries.
    fn completion_request(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        format: ResponseFormat,
    ) -> ChatCompletionRequest {
        let temperature = match format {
            ResponseFormat::Json => 0.0,
            ResponseFormat::Text => self.config.temperature,
        };
        ChatCompletionRequest {
            model: model.unwrap_or(&self.config.model).to_string(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(temperature),
        }
    }

    async fn send(&self, request: ChatCompletionRequest) -> Result<LlmResponse> {
        let model = request.model.clone();
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|api_error| api_error.error.message)
                .unwrap_or(body);
            return Err(classify_status(status, message));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PageIndexError::MalformedResponse("No choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(model = %model, "completion truncated at max_tokens");
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| PageIndexError::MalformedResponse("Empty message content".to_string()))?;

        let usage = completion.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(usage) = &usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM usage"
            );
        }

        Ok(LlmResponse {
            content,
            finish_reason: choice.finish_reason,
            usage,
        })
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(PageIndexError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

impl TextGenerator for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(task = request.task.as_str(), chars = request.prompt.len(), "LLM request");
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(Message::system(system.as_str()));
        }
        messages.push(Message::user(request.prompt.as_str()));

        let body = self.completion_request(messages, request.model.as_deref(), request.format);
        Ok(self.send(body).await?.content)
    }
}

/// Map an HTTP failure onto the retryable/permanent error split.
fn classify_status(status: StatusCode, message: String) -> PageIndexError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            PageIndexError::RateLimited(format!("API error ({}): {}", status, message))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            PageIndexError::Timeout(format!("API error ({}): {}", status, message))
        }
        s if s.is_server_error() => {
            // overloaded or flaky upstream, worth another attempt
            PageIndexError::Timeout(format!("API error ({}): {}", status, message))
        }
        _ => PageIndexError::LlmApi(format!("API error ({}): {}", status, message)),
    }
}

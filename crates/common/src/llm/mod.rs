//! Text completion client abstraction
//!
//! Provides:
//! - `Completer` trait over role-tagged chat messages
//! - OpenAI-compatible chat completion client
//! - Mock completer for development and tests

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

/// Trait for text completion
#[async_trait]
pub trait Completer: Send + Sync {
    /// Generate a completion for the ordered messages
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completion client
pub struct OpenAICompleter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAICompleter {
    /// Create a new completion client
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Completer for OpenAICompleter {
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::CompletionUnavailable {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionUnavailable {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::CompletionUnavailable {
                    message: format!("Failed to parse LLM response: {}", e),
                })?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

enum MockBehavior {
    /// Cite the first citation token found in the prompt
    Echo,
    /// Always reply with the given text
    Reply(String),
    /// Always fail as an unreachable endpoint
    Unavailable,
}

/// Mock completer for development and testing
pub struct MockCompleter {
    behavior: MockBehavior,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockCompleter {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::Echo)
    }

    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Reply(reply.into()))
    }

    pub fn unavailable() -> Self {
        Self::with_behavior(MockBehavior::Unavailable)
    }

    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Messages received so far, one entry per call
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockCompleter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, messages: &[ChatMessage], _params: &CompletionParams) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        match &self.behavior {
            MockBehavior::Reply(reply) => Ok(reply.clone()),
            MockBehavior::Unavailable => Err(AppError::CompletionUnavailable {
                message: "mock completer configured as unavailable".to_string(),
            }),
            MockBehavior::Echo => {
                let prompt = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                let citation = prompt
                    .find("[Node-")
                    .and_then(|start| {
                        prompt[start..]
                            .find(']')
                            .map(|end| &prompt[start..start + end + 1])
                    });
                Ok(match citation {
                    Some(token) => format!(
                        "Based on the provided context, the most relevant evidence is {}. \
                         [Mock response - LLM API key not configured]",
                        token
                    ),
                    None => "The provided context does not contain enough information. \
                             [Mock response - LLM API key not configured]"
                        .to_string(),
                })
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

/// Create a completer based on configuration
pub fn create_completer(config: &LlmConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAICompleter::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockCompleter::new())),
        other => {
            tracing::warn!(provider = other, "Unknown completion provider, using mock");
            Ok(Arc::new(MockCompleter::new()))
        }
    }
}

use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::AppError, utils::retry::RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    pub const fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Chat-style language model the agents talk to.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, AppError>;
}

/// OpenAI-compatible chat completion backend.
pub struct OpenAiLanguageModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiLanguageModel {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.1,
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn complete_once(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<Completion, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))?;

        let usage = response
            .usage
            .map(|usage| {
                TokenUsage::new(
                    u64::from(usage.prompt_tokens),
                    u64::from(usage.completion_tokens),
                )
            })
            .unwrap_or_default();

        Ok(Completion { content, usage })
    }
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, AppError> {
        let request_messages: Vec<ChatCompletionRequestMessage> = messages
            .iter()
            .map(|message| match message.role {
                MessageRole::System => {
                    ChatCompletionRequestSystemMessage::from(message.content.as_str()).into()
                }
                MessageRole::User => {
                    ChatCompletionRequestUserMessage::from(message.content.as_str()).into()
                }
            })
            .collect();

        let call = self
            .retry
            .run_transient(|| self.complete_once(request_messages.clone()));

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => {
                if let Ok(completion) = &result {
                    debug!(
                        model = %self.model,
                        input_tokens = completion.usage.input_tokens,
                        output_tokens = completion.usage.output_tokens,
                        "Language model call completed"
                    );
                }
                result
            }
            Err(_) => {
                warn!(model = %self.model, timeout_secs = self.timeout.as_secs(), "Language model call timed out");
                Err(AppError::Timeout(format!(
                    "language model '{}' did not answer within {}s",
                    self.model,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

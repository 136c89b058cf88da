//! Chat-completion provider abstraction and the OpenAI implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod openai;
pub mod streaming;

pub use openai::{OpenAiClient, OpenAiFactory, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use streaming::{consume_stream, AnswerStream, SseEvent, SseParser, StreamState};

/// Error types for LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit { retry_after: Option<u64> },

    #[error("Invalid model: {model}")]
    InvalidModel { model: String },

    #[error("Request failed: {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response format: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Represents a message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

/// Model and sampling settings sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            top_p: None,
            max_tokens: None,
        }
    }
}

/// The answer assembled so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub id: String,
    pub text: String,
}

/// A question and its (possibly still streaming) answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub question: String,
    pub answer: ChatAnswer,
}

/// Progress callback invoked with every new answer snapshot
pub type ProgressFn<'a> = dyn FnMut(&ChatAnswer) + Send + 'a;

/// A provider that answers one prompt with a streamed reply
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging
    fn provider_name(&self) -> &str;

    /// Send `prompt` and stream the answer, calling `on_progress` per delta
    async fn send(&self, prompt: &str, on_progress: &mut ProgressFn<'_>) -> Result<ChatAnswer, LlmError>;
}

/// Builds providers once the API key is known
pub trait ChatProviderFactory: Send + Sync {
    fn create(&self, api_key: &str) -> Result<Box<dyn ChatProvider>, LlmError>;
}

//! OpenAI chat-completion provider with streamed answers

use super::streaming::consume_stream;
use super::{ChatAnswer, ChatProvider, ChatProviderFactory, CompletionParams, LlmError, Message, ProgressFn};
use crate::utils::http::{create_client, parse_http_error, HeaderBuilder, SharedHttpConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(flatten)]
    params: &'a CompletionParams,
    messages: Vec<Message>,
    stream: bool,
}

/// OpenAI API provider
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    params: CompletionParams,
}

impl OpenAiClient {
    /// Create a new OpenAI client against the public endpoint
    pub fn new(api_key: String, params: CompletionParams) -> Result<Self, LlmError> {
        Self::with_config(api_key, params, None, &SharedHttpConfig::default())
    }

    /// Create a new OpenAI client with custom configuration
    pub fn with_config(
        api_key: String,
        params: CompletionParams,
        base_url: Option<String>,
        http: &SharedHttpConfig,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: create_client(http)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            params,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn create_headers(&self) -> Result<reqwest::header::HeaderMap, LlmError> {
        let headers = HeaderBuilder::new()
            .json_content_type()
            .accept_event_stream()
            .bearer_auth(&self.api_key)
            .map_err(|_| LlmError::Authentication {
                message: "API key contains characters that are not allowed in a header".to_string(),
            })?
            .build();
        Ok(headers)
    }

    /// Stream the answer to `prompt`, calling `on_progress` with each snapshot
    pub async fn send<F>(&self, prompt: &str, on_progress: &mut F) -> Result<ChatAnswer, LlmError>
    where
        F: FnMut(&ChatAnswer) + Send + ?Sized,
    {
        let request = ChatCompletionRequest {
            params: &self.params,
            messages: vec![Message::user(prompt)],
            stream: true,
        };

        debug!(
            model = %self.params.model,
            prompt_chars = prompt.chars().count(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .headers(self.create_headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, Some(&self.params.model)));
        }

        let answer = consume_stream(response.bytes_stream(), on_progress).await?;
        info!(
            id = %answer.id,
            answer_chars = answer.text.chars().count(),
            "Chat completion finished"
        );
        Ok(answer)
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn send(&self, prompt: &str, on_progress: &mut ProgressFn<'_>) -> Result<ChatAnswer, LlmError> {
        OpenAiClient::send(self, prompt, on_progress).await
    }
}

/// Creates `OpenAiClient`s from a key and shared settings
#[derive(Debug, Clone)]
pub struct OpenAiFactory {
    pub params: CompletionParams,
    pub base_url: Option<String>,
    pub http: SharedHttpConfig,
}

impl OpenAiFactory {
    pub fn new(params: CompletionParams) -> Self {
        Self {
            params,
            base_url: None,
            http: SharedHttpConfig::default(),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_http_config(mut self, http: SharedHttpConfig) -> Self {
        self.http = http;
        self
    }
}

impl ChatProviderFactory for OpenAiFactory {
    fn create(&self, api_key: &str) -> Result<Box<dyn ChatProvider>, LlmError> {
        let client = OpenAiClient::with_config(
            api_key.to_string(),
            self.params.clone(),
            self.base_url.clone(),
            &self.http,
        )?;
        Ok(Box::new(client))
    }
}

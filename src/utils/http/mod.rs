//! Shared HTTP utilities for the chat-completion client

use crate::llm::LlmError;
use reqwest::Client;
use std::time::Duration;

pub mod headers;

pub use headers::HeaderBuilder;

/// Default connect timeout for HTTP requests (2 minutes)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_USER_AGENT: &str = concat!("gpt-with-context/", env!("CARGO_PKG_VERSION"));

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct SharedHttpConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for SharedHttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

/// Create a configured reqwest client
///
/// Only connecting is bounded by the timeout; a streamed answer may take
/// longer than that to arrive in full.
pub fn create_client(config: &SharedHttpConfig) -> Result<Client, LlmError> {
    let mut builder = Client::builder().connect_timeout(config.timeout);

    if let Some(ref user_agent) = config.user_agent {
        builder = builder.user_agent(user_agent);
    }

    builder.build().map_err(LlmError::Network)
}

/// Parse standard HTTP error responses
pub fn parse_http_error(status: u16, body: &str, model_name: Option<&str>) -> LlmError {
    match status {
        429 => {
            let retry_after = extract_retry_after(body);
            LlmError::RateLimit { retry_after }
        }
        401 | 403 => LlmError::Authentication {
            message: extract_error_message(body)
                .unwrap_or_else(|| "Invalid API key or insufficient permissions".to_string()),
        },
        404 if body.contains("model") => LlmError::InvalidModel {
            model: model_name.unwrap_or("unknown").to_string(),
        },
        _ => LlmError::RequestFailed {
            status,
            message: extract_error_message(body).unwrap_or_else(|| body.to_string()),
        },
    }
}

/// Extract retry-after value from error response
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}

/// Extract `error.message` from an OpenAI style error body
fn extract_error_message(body: &str) -> Option<String> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = parse_http_error(401, r#"{"error":{"message":"Incorrect API key provided"}}"#, None);
        assert!(matches!(err, LlmError::Authentication { ref message } if message == "Incorrect API key provided"));

        let err = parse_http_error(429, r#"{"error":{"retry_after":7}}"#, None);
        assert!(matches!(err, LlmError::RateLimit { retry_after: Some(7) }));

        let err = parse_http_error(404, r#"{"error":{"message":"The model `x` does not exist"}}"#, Some("x"));
        assert!(matches!(err, LlmError::InvalidModel { ref model } if model == "x"));

        let err = parse_http_error(500, "upstream exploded", None);
        assert!(matches!(err, LlmError::RequestFailed { status: 500, ref message } if message == "upstream exploded"));
    }

    #[test]
    fn test_create_client() {
        assert!(create_client(&SharedHttpConfig::default()).is_ok());
    }
}

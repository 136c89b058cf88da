//! Error types used throughout the application

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gpt-with-context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("Search error: {message}")]
    Search { message: String },

    #[error("Store error: {key}: {message}")]
    Store { key: String, message: String },

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("File system error: {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization/deserialization error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{message}")]
    MissingApiKey { message: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration directory not found")]
    NoConfigDir,

    #[error("Failed to read configuration: {source}")]
    ReadError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write configuration: {source}")]
    WriteError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError {
        #[source]
        source: toml::ser::Error,
    },
}

impl AppError {
    /// Create a new search error
    pub fn search<S: Into<String>>(message: S) -> Self {
        Self::Search {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store<S1: Into<String>, S2: Into<String>>(key: S1, message: S2) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new file system error
    pub fn file_system<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new unknown error
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Error raised when a question is asked before an API key is stored
    pub fn missing_api_key() -> Self {
        Self::Config(ConfigError::MissingApiKey {
            message: "OpenAI API key is not set".to_string(),
        })
    }

    /// Add context to an existing error
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        match &mut self {
            Self::Search { message }
            | Self::Store { message, .. }
            | Self::Validation { message, .. }
            | Self::Unknown { message } => {
                *message = format!("{}: {}", context.into(), message);
            }
            Self::NotFound { resource } => {
                *resource = format!("{}: {}", context.into(), resource);
            }
            _ => {
                let original = format!("{}", self);
                return Self::unknown(format!("{}: {}", context.into(), original));
            }
        }
        self
    }

    /// Whether the error comes from missing or invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation { .. })
    }

    /// Message shown to the user, without the category prefix for
    /// configuration and provider errors
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.to_string(),
            Self::Llm(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Llm(_) => "llm",
            Self::Search { .. } => "search",
            Self::Store { .. } => "store",
            Self::Validation { .. } => "validation",
            Self::FileSystem { .. } => "filesystem",
            Self::NotFound { .. } => "notfound",
            Self::Json(_) => "json",
            Self::Toml(_) => "toml",
            Self::Io(_) => "io",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_message() {
        let err = AppError::missing_api_key();
        assert!(err.is_configuration());
        assert_eq!(err.category(), "config");
        assert_eq!(err.to_string(), "Configuration error: OpenAI API key is not set");
        assert_eq!(err.user_message(), "OpenAI API key is not set");
    }

    #[test]
    fn test_with_context() {
        let err = AppError::search("walk failed").with_context("listing files");
        assert_eq!(err.to_string(), "Search error: listing files: walk failed");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = AppError::file_system("a.txt", io).with_context("reading");
        assert_eq!(err.category(), "unknown");
        assert!(err.to_string().contains("reading: File system error: a.txt: gone"));
    }
}

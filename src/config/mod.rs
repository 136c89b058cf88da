//! Configuration management for gpt-with-context

use crate::llm::{CompletionParams, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::utils::errors::{AppError, ConfigError};
use crate::utils::http::SharedHttpConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_CONFIG_DIR: &str = "gpt-with-context";
const CONFIG_FILE: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat-completion model
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Base URL of the OpenAI compatible API
    pub api_base_url: String,
    /// Maximum number of files a selection may return
    pub max_results: usize,
    /// Maximum number of files read at the same time
    pub read_concurrency: usize,
    /// Connect timeout for chat requests (seconds)
    pub request_timeout_seconds: u64,
    /// Directory holding per-workspace state; platform data dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// File holding the stored API key; platform config dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets_file: Option<PathBuf>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            max_results: crate::context::DEFAULT_MAX_RESULTS,
            read_concurrency: crate::context::DEFAULT_READ_CONCURRENCY,
            request_timeout_seconds: 120,
            state_dir: None,
            secrets_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Check if the configuration is valid
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AppError::validation("model", "Model name must not be empty"));
        }

        if self.max_results == 0 {
            return Err(AppError::validation("max_results", "Must be at least 1"));
        }

        if self.read_concurrency == 0 {
            return Err(AppError::validation("read_concurrency", "Must be at least 1"));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue {
                    key: "temperature".to_string(),
                    value: temperature.to_string(),
                }
                .into());
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(ConfigError::InvalidValue {
                    key: "top_p".to_string(),
                    value: top_p.to_string(),
                }
                .into());
            }
        }

        url::Url::parse(&self.api_base_url).map_err(|_| ConfigError::InvalidValue {
            key: "api_base_url".to_string(),
            value: self.api_base_url.clone(),
        })?;

        Ok(())
    }

    /// Request settings for the chat provider
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }

    /// HTTP client settings for the chat provider
    pub fn http_config(&self) -> SharedHttpConfig {
        SharedHttpConfig {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            ..SharedHttpConfig::default()
        }
    }
}

/// Configuration manager for loading and saving application configuration
pub struct ConfigManager {
    config: Config,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load the configuration from the platform config directory
    pub fn new() -> Result<Self> {
        Self::load_from(Self::default_config_path()?)
    }

    /// Load the configuration at `path`, writing the defaults if it is missing
    pub fn load_from<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let config_path = path.into();
        let config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else {
            let default_config = Config::default();
            Self::save_config(&config_path, &default_config)?;
            tracing::info!("Created default configuration at {}", config_path.display());
            default_config
        };

        config.validate()?;
        Ok(Self { config, config_path })
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        Self::save_config(&self.config_path, &self.config)
    }

    /// Update the model
    pub fn set_model(&mut self, model: String) -> Result<()> {
        self.config.model = model;
        self.config.validate()?;
        self.save()
    }

    /// Default location of the configuration file
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from file
    fn load_config(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError { source: e })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError { source: e })
            .map_err(Into::into)
    }

    /// Save configuration to file
    fn save_config(path: &Path, config: &Config) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
            }
        }

        let content = toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

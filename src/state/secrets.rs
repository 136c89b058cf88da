//! Storage of the API key

use crate::utils::errors::AppError;
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;

/// Secret entry holding the OpenAI API key
pub const API_KEY_SECRET: &str = "openAIAPIKey";

/// Environment variable that takes precedence over the stored key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Secrets kept in a JSON file readable only by the current user
pub struct FileSecretStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileSecretStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Default location next to the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gpt-with-context").join("secrets.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(AppError::file_system(&self.path, e)),
        }
    }

    async fn save(&self, secrets: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_system(parent, e))?;
        }

        let content = serde_json::to_string_pretty(secrets)?;

        // Created owner-only, then renamed over the old file
        let tmp = self.path.with_extension("json.tmp");
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::file_system(&tmp, e)),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await.map_err(|e| AppError::file_system(&tmp, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| AppError::file_system(&tmp, e))?;
        file.sync_all().await.map_err(|e| AppError::file_system(&tmp, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::file_system(&self.path, e))?;

        Ok(())
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut secrets = self.load().await?;
        secrets.insert(key.to_string(), value.to_string());
        self.save(&secrets).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut secrets = self.load().await?;
        if secrets.remove(key).is_some() {
            self.save(&secrets).await?;
        }
        Ok(())
    }
}

/// Where the active API key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    SecretStore,
}

/// Resolves the API key, environment variable first
#[derive(Clone)]
pub struct ApiKeyResolver {
    env_var: String,
    secrets: Arc<dyn SecretStore>,
}

impl ApiKeyResolver {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_env_var(API_KEY_ENV, secrets)
    }

    pub fn with_env_var<S: Into<String>>(env_var: S, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            env_var: env_var.into(),
            secrets,
        }
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// Get the API key and where it came from
    pub async fn resolve(&self) -> Result<Option<(String, KeySource)>> {
        if let Ok(api_key) = std::env::var(&self.env_var) {
            if !api_key.trim().is_empty() {
                return Ok(Some((api_key.trim().to_string(), KeySource::Environment)));
            }
        }

        let stored = self.secrets.get(API_KEY_SECRET).await?;
        Ok(stored
            .filter(|key| !key.trim().is_empty())
            .map(|key| (key, KeySource::SecretStore)))
    }

    /// Get the API key or fail with a configuration error
    pub async fn require(&self) -> Result<String> {
        self.resolve()
            .await?
            .map(|(key, _)| key)
            .ok_or_else(AppError::missing_api_key)
    }

    pub async fn store(&self, api_key: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::validation(API_KEY_SECRET, "API key must not be empty"));
        }
        self.secrets.set(API_KEY_SECRET, api_key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.secrets.delete(API_KEY_SECRET).await
    }
}

//! Durable key-value storage for per-workspace settings

use crate::utils::errors::AppError;
use crate::utils::path::WorkspaceContext;
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Persisted include pattern text
pub const FILES_TO_INCLUDE_KEY: &str = "filesToInclude";

/// Persisted exclude pattern text
pub const FILES_TO_EXCLUDE_KEY: &str = "filesToExclude";

/// Key-value storage with synchronous reads and durable asynchronous writes
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value`; it is durable once the returned future completes
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Non-durable store used in tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Store kept as one JSON document on disk
///
/// Reads are served from memory. Each write rewrites the document through a
/// temporary file and a rename.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<IndexMap<String, Value>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => IndexMap::new(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AppError::store(path.display().to_string(), format!("corrupt state file: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => return Err(AppError::file_system(&path, e)),
        };

        tracing::debug!("Opened state store {} with {} keys", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Open the store holding the state of `workspace` under `state_dir`
    pub fn for_workspace<P: AsRef<Path>>(state_dir: P, workspace: &WorkspaceContext) -> Result<Self> {
        Self::open(state_dir.as_ref().join(format!("{}.json", workspace.storage_key())))
    }

    /// Default directory for workspace state
    pub fn default_state_dir() -> Option<PathBuf> {
        dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .map(|dir| dir.join("gpt-with-context").join("workspaces"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.values.lock().unwrap_or_else(PoisonError::into_inner).clone();
        next.insert(key.to_string(), value);
        let content = serde_json::to_string_pretty(&next)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::file_system(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| AppError::file_system(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::file_system(&self.path, e))?;

        *self.values.lock().unwrap_or_else(PoisonError::into_inner) = next;
        Ok(())
    }
}

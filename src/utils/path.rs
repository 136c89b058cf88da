//! Path utilities and workspace management

use crate::utils::errors::AppError;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

const MAX_KEY_NAME_LEN: usize = 64;

/// The project directory files are selected from
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    /// The canonical root path of the workspace
    pub root: PathBuf,
}

impl WorkspaceContext {
    /// Create a new workspace context
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, AppError> {
        let root_path = root.as_ref();
        let root = root_path
            .canonicalize()
            .map_err(|e| AppError::file_system(root_path.to_path_buf(), e))?;

        if !root.is_dir() {
            return Err(AppError::validation(
                "workdir",
                format!("Workspace root must be a directory: {}", root.display()),
            ));
        }

        if !root.join(".git").exists() && !root.join(".gitignore").exists() {
            tracing::debug!(
                "Workspace {} is not a git checkout, no ignore rules will apply",
                root.display()
            );
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key identifying this workspace in per-workspace storage
    ///
    /// The directory name keeps the key readable; the SHA-256 of the full
    /// canonical path keeps distinct workspaces apart.
    pub fn storage_key(&self) -> String {
        let name: String = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(MAX_KEY_NAME_LEN)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(self.root.as_os_str().as_encoded_bytes());
        let digest = format!("{:x}", hasher.finalize());

        if name.is_empty() {
            digest
        } else {
            format!("{}-{}", name, digest)
        }
    }
}

/// `/`-separated path of `path` relative to `root`
///
/// Returns `None` when `path` is not below `root` or is the root itself.
pub fn relative_slash_path<P: AsRef<Path>, Q: AsRef<Path>>(root: P, path: Q) -> Option<String> {
    let relative = path.as_ref().strip_prefix(root.as_ref()).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

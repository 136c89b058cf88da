//! Project context: which files are selected and what they contain

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

pub mod patterns;
pub mod prompt;
pub mod search;
pub mod selector;
pub mod summary;

pub use patterns::{gitignore_to_patterns, string_to_patterns, PatternGroup, PatternSet};
pub use prompt::build_prompt;
pub use search::{FileReader, FileSearch};
pub use selector::{FileSelector, DEFAULT_MAX_RESULTS};
pub use summary::{FileMeta, FileSummarizer, MetaTotals, DEFAULT_READ_CONCURRENCY};

/// A file inside the project root
///
/// Two references are equal when their root-relative paths are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    /// Path relative to the project root, always `/`-separated
    relative: String,
    /// Absolute path used for reading
    path: PathBuf,
}

impl FileRef {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(relative: S, path: P) -> Self {
        Self {
            relative: relative.into(),
            path: path.into(),
        }
    }

    /// Build a reference from a root and a `/`-separated relative path
    pub fn under<P: AsRef<Path>>(root: P, relative: &str) -> Self {
        let path = relative
            .split('/')
            .fold(root.as_ref().to_path_buf(), |acc, part| acc.join(part));
        Self::new(relative, path)
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.relative == other.relative
    }
}

impl Eq for FileRef {}

impl Hash for FileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative.hash(state);
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.relative)
    }
}

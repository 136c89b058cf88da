//! Assembles include, exclude and ignore patterns and runs the file search

use super::patterns::{gitignore_to_patterns, string_to_patterns, PatternSet};
use super::search::FileSearch;
use super::FileRef;
use crate::utils::fs::read_optional_to_string;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Default cap on the number of files one search may return
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Entries excluded regardless of user input: ignore files and VCS metadata
const ALWAYS_EXCLUDED: &str = ".gitignore, .git, .hg, .svn";

/// Selects project files from user pattern text
///
/// Only the `.gitignore` at the project root is consulted; nested ignore files
/// and negated entries are not applied.
pub struct FileSelector {
    root: PathBuf,
    search: Arc<dyn FileSearch>,
    max_results: usize,
}

impl FileSelector {
    pub fn new<P: Into<PathBuf>>(root: P, search: Arc<dyn FileSearch>) -> Self {
        Self {
            root: root.into(),
            search,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Find the files selected by `include_text` minus `exclude_text` and the
    /// root ignore file
    pub async fn find_files(&self, include_text: &str, exclude_text: &str) -> Result<Vec<FileRef>> {
        let include: PatternSet = string_to_patterns(include_text).into_iter().collect();
        let exclude: PatternSet = string_to_patterns(exclude_text).into_iter().collect();
        let ignored = self.ignore_patterns().await?;
        let always: PatternSet = string_to_patterns(ALWAYS_EXCLUDED).into_iter().collect();

        let include_group = include.into_group();
        let exclude_group = exclude.union(ignored).union(always).into_group();

        debug!(
            include = %include_group,
            exclude = %exclude_group,
            max_results = self.max_results,
            "Searching files"
        );

        let files = self
            .search
            .search(&include_group, &exclude_group, self.max_results)
            .await?;

        debug!("Selected {} files", files.len());
        Ok(files)
    }

    async fn ignore_patterns(&self) -> Result<PatternSet> {
        let gitignore = self.root.join(".gitignore");
        let patterns = match read_optional_to_string(&gitignore).await? {
            Some(content) => gitignore_to_patterns(&content).into_iter().collect(),
            None => PatternSet::new(),
        };
        Ok(patterns)
    }
}

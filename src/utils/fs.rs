//! File system backed search and reads

use crate::context::{FileReader, FileRef, FileSearch, PatternGroup};
use crate::utils::errors::AppError;
use crate::utils::path::relative_slash_path;
use crate::Result;
use async_trait::async_trait;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Read a text file, treating a missing file as `None`
pub async fn read_optional_to_string<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::file_system(path, e)),
    }
}

/// Compile every member of a group into one glob set
///
/// `*` and `?` never match `/`; only `**` crosses directory boundaries.
pub fn compile_group(group: &PatternGroup) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in group.members() {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| AppError::search(format!("invalid pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| AppError::search(format!("failed to build pattern set: {}", e)))
}

/// Walks the project tree and matches root-relative paths against the groups
///
/// The walker's own `.gitignore`/hidden-file filtering is disabled: ignore
/// rules reach the search only through the exclude group.
#[derive(Debug, Clone)]
pub struct WalkSearch {
    root: PathBuf,
}

impl WalkSearch {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileSearch for WalkSearch {
    async fn search(
        &self,
        include: &PatternGroup,
        exclude: &PatternGroup,
        max_results: usize,
    ) -> Result<Vec<FileRef>> {
        let include = compile_group(include)?;
        let exclude = compile_group(exclude)?;
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || walk(&root, &include, &exclude, max_results))
            .await
            .map_err(|e| AppError::search(format!("search task failed: {}", e)))?
    }
}

fn walk(root: &Path, include: &GlobSet, exclude: &GlobSet, max_results: usize) -> Result<Vec<FileRef>> {
    let mut files = Vec::new();
    if include.is_empty() || max_results == 0 {
        return Ok(files);
    }

    let prune = exclude.clone();
    let prune_root = root.to_path_buf();

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
            if entry.depth() == 0 || !is_dir {
                return true;
            }
            match relative_slash_path(&prune_root, entry.path()) {
                Some(rel) => !(prune.is_match(&rel) || prune.is_match(format!("{}/", rel))),
                None => true,
            }
        });

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Failed to process file entry: {}", err);
                continue;
            }
        };

        if !entry.file_type().map_or(false, |ft| ft.is_file()) {
            continue;
        }

        let Some(rel) = relative_slash_path(root, entry.path()) else {
            continue;
        };

        if exclude.is_match(&rel) || !include.is_match(&rel) {
            continue;
        }

        files.push(FileRef::new(rel, entry.path().to_path_buf()));
        if files.len() >= max_results {
            tracing::debug!("Search stopped at the result cap of {}", max_results);
            break;
        }
    }

    Ok(files)
}

/// Reads file content with `tokio::fs`
#[derive(Debug, Clone, Default)]
pub struct FsReader;

#[async_trait]
impl FileReader for FsReader {
    async fn read(&self, file: &FileRef) -> Result<Vec<u8>> {
        tokio::fs::read(file.path())
            .await
            .map_err(|e| AppError::file_system(file.path(), e))
    }
}

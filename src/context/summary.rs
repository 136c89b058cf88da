//! Line and character counts for selected files

use super::search::FileReader;
use super::FileRef;
use crate::utils::errors::AppError;
use crate::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of files read at the same time
pub const DEFAULT_READ_CONCURRENCY: usize = 16;

/// Size information about one selected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub file: FileRef,
    /// Lines that are not blank after trimming
    pub loc_count: usize,
    /// Characters in the untrimmed content
    pub char_count: usize,
}

impl FileMeta {
    /// Compute counts from raw content, decoding it as lossy UTF-8
    pub fn from_content(file: FileRef, content: &[u8]) -> Self {
        let text = String::from_utf8_lossy(content);
        Self {
            file,
            loc_count: count_loc(&text),
            char_count: text.chars().count(),
        }
    }
}

fn count_loc(text: &str) -> usize {
    text.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Totals across a set of files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTotals {
    pub files: usize,
    pub loc_count: usize,
    pub char_count: usize,
}

impl MetaTotals {
    pub fn of(metas: &[FileMeta]) -> Self {
        metas.iter().fold(Self::default(), |acc, meta| Self {
            files: acc.files + 1,
            loc_count: acc.loc_count + meta.loc_count,
            char_count: acc.char_count + meta.char_count,
        })
    }
}

/// Reads files and computes their `FileMeta`
pub struct FileSummarizer {
    reader: Arc<dyn FileReader>,
    concurrency: usize,
}

impl FileSummarizer {
    pub fn new(reader: Arc<dyn FileReader>) -> Self {
        Self {
            reader,
            concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Compute metadata for every file, in input order
    ///
    /// Up to `concurrency` reads are in flight at once. The first failed read
    /// fails the whole batch.
    pub async fn compute_metas(&self, files: &[FileRef]) -> Result<Vec<FileMeta>> {
        stream::iter(files.iter().cloned())
            .map(|file| {
                let reader = Arc::clone(&self.reader);
                async move {
                    let content = reader.read(&file).await?;
                    Ok::<_, AppError>(FileMeta::from_content(file, &content))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Read every file as text, in input order
    pub async fn read_contents(&self, files: &[FileRef]) -> Result<Vec<(FileRef, String)>> {
        stream::iter(files.iter().cloned())
            .map(|file| {
                let reader = Arc::clone(&self.reader);
                async move {
                    let content = reader.read(&file).await?;
                    let text = String::from_utf8_lossy(&content).into_owned();
                    Ok::<_, AppError>((file, text))
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

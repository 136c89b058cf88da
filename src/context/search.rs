//! Seams to the file system: pattern search and content reads

use super::{FileRef, PatternGroup};
use crate::Result;
use async_trait::async_trait;

/// Finds files under a project root
#[async_trait]
pub trait FileSearch: Send + Sync {
    /// Return files matching `include` and not matching `exclude`
    ///
    /// At most `max_results` files are returned; anything past the cap is
    /// dropped without an error.
    async fn search(
        &self,
        include: &PatternGroup,
        exclude: &PatternGroup,
        max_results: usize,
    ) -> Result<Vec<FileRef>>;
}

/// Reads raw file content
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, file: &FileRef) -> Result<Vec<u8>>;
}

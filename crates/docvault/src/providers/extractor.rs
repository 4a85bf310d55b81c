//! Text extraction capability

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// Turns a stored file into plain text
///
/// The file extension is part of the path and may be used to pick a format.
/// Failures should be `Error::Extraction` or `Error::UnsupportedFileType`.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text of the file at `path`
    async fn extract_text(&self, path: &Path) -> Result<String>;

    /// Extractor name for logging
    fn name(&self) -> &str;
}

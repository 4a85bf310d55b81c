//! File types and the persisted index record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker stored in `IndexRecord::error` when text extraction failed
pub const EXTRACTION_FAILED: &str = "extraction_failed";

/// File types the built-in extractor understands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// HTML document
    Html,
    /// CSV file
    Csv,
    /// Source code or structured text file with language
    Code(String),
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" | "log" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "csv" => Self::Csv,
            // Code files
            "rs" => Self::Code("rust".to_string()),
            "py" => Self::Code("python".to_string()),
            "js" => Self::Code("javascript".to_string()),
            "ts" => Self::Code("typescript".to_string()),
            "go" => Self::Code("go".to_string()),
            "java" => Self::Code("java".to_string()),
            "c" | "h" => Self::Code("c".to_string()),
            "cpp" | "cc" | "cxx" => Self::Code("cpp".to_string()),
            "sql" => Self::Code("sql".to_string()),
            "sh" | "bash" => Self::Code("bash".to_string()),
            "yaml" | "yml" => Self::Code("yaml".to_string()),
            "json" => Self::Code("json".to_string()),
            "xml" => Self::Code("xml".to_string()),
            "toml" => Self::Code("toml".to_string()),
            _ => Self::Unknown,
        }
    }
}

/// One searchable entry in a namespace index
///
/// Field names match the on-disk JSON. Unknown fields are ignored on read and
/// every optional field may be missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    /// Stored filename (older indexes may hold a full path)
    pub file: String,
    /// Extracted text, empty for sentinel records
    #[serde(default)]
    pub content: String,
    /// Embedding of `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// When the record was appended
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Failure marker, see [`EXTRACTION_FAILED`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Size of the stored file in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// SHA-256 of the stored bytes, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl IndexRecord {
    /// Record for a successfully extracted file
    pub fn extracted(filename: impl Into<String>, content: String) -> Self {
        Self {
            file: filename.into(),
            content,
            vector: None,
            created_at: Some(Utc::now()),
            error: None,
            size: None,
            sha256: None,
        }
    }

    /// Sentinel record: the file is accounted for but has no searchable text
    pub fn extraction_failed(filename: impl Into<String>) -> Self {
        Self {
            file: filename.into(),
            content: String::new(),
            vector: None,
            created_at: Some(Utc::now()),
            error: Some(EXTRACTION_FAILED.to_string()),
            size: None,
            sha256: None,
        }
    }

    /// Attach stored-file facts
    pub fn with_file_facts(mut self, size: u64, sha256: String) -> Self {
        self.size = Some(size);
        self.sha256 = Some(sha256);
        self
    }

    /// Bare filename of the record, stripping any legacy path prefix
    pub fn filename(&self) -> &str {
        Path::new(&self.file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file)
    }

    /// True when extraction failed for this file
    pub fn is_sentinel(&self) -> bool {
        self.error.as_deref() == Some(EXTRACTION_FAILED)
    }

    /// True when the record has text that an embedding could be computed from
    pub fn needs_embedding(&self) -> bool {
        self.vector.is_none() && !self.is_sentinel() && !self.content.trim().is_empty()
    }
}

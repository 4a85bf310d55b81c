//! Response types for ingestion, search, listing, and quota reporting

use serde::{Deserialize, Serialize};

use super::SearchMode;

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stored filename
    pub filename: String,
    /// Leading characters of the extracted text
    pub snippet: String,
    /// Occurrence count (lexical), cosine similarity (semantic), or blended score (hybrid)
    pub score: f32,
    /// Position of the record in the index
    pub position: usize,
}

/// Ordered search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Query after validation and sanitizing
    pub query: String,
    /// Mode the request asked for
    pub mode_requested: SearchMode,
    /// Mode actually executed (semantic degrades to lexical without embeddings)
    pub mode_used: SearchMode,
    /// Hits, best first
    pub results: Vec<SearchHit>,
    /// Number of hits
    pub count: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Outcome of a completed ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// Text extracted and indexed
    Indexed,
    /// File kept, sentinel record indexed, content not searchable
    ExtractionFailed,
}

/// Result of a successful ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Stored filename
    pub filename: String,
    /// Indexed or extraction_failed
    pub status: IngestStatus,
    /// Bytes stored
    pub size: u64,
    /// Whether the record carries a vector
    pub embedded: bool,
    /// Characters of extracted text
    pub text_chars: usize,
    /// Extraction failure detail when status is extraction_failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    /// Index length after the append
    pub index_len: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// A file in a namespace and how the index sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileInfo {
    /// Stored filename
    pub filename: String,
    /// Size on disk in bytes
    pub size: u64,
    /// At least one index record refers to the file
    pub indexed: bool,
    /// The latest record for the file is an extraction sentinel
    pub extraction_failed: bool,
    /// On disk but not in the index: an ingest died between commit and append
    pub orphaned: bool,
}

/// Storage usage for a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Bytes of user content stored
    pub used: u64,
    /// Configured ceiling
    pub ceiling: u64,
    /// Bytes still admissible
    pub remaining: u64,
}

impl QuotaStatus {
    /// Build from usage and ceiling
    pub fn new(used: u64, ceiling: u64) -> Self {
        Self {
            used,
            ceiling,
            remaining: ceiling.saturating_sub(used),
        }
    }
}

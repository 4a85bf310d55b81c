//! docvault: per-user document storage with quota-aware ingestion and search
//!
//! Each user owns an isolated namespace directory holding uploaded files and
//! an append-only JSON index of their extracted text. Uploads pass a quota
//! check, are persisted atomically, have their text extracted and optionally
//! embedded, and only then become searchable. Search runs lexically, or
//! semantically when an embedding provider is configured.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::{DuplicatePolicy, VaultConfig};
pub use error::{Error, Result};
pub use ingestion::{FileParser, IngestOutcome, IngestRequest, IngestionPipeline};
pub use providers::{EmbeddingProvider, TextExtractor};
pub use retrieval::SearchEngine;
pub use storage::{DocumentStore, QuotaGuard};
pub use types::{
    IndexRecord, SearchMode, SearchRequest, SearchResponse, StoredFileName, UserNamespace,
};

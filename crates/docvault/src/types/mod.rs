//! Core types for the document vault

pub mod document;
pub mod namespace;
pub mod query;
pub mod response;

pub use document::{FileType, IndexRecord, EXTRACTION_FAILED};
pub use namespace::{StoredFileName, UserNamespace};
pub use query::{SearchMode, SearchRequest};
pub use response::{
    IngestResponse, IngestStatus, QuotaStatus, SearchHit, SearchResponse, StoredFileInfo,
};

//! Storage module for per-user files and indexes
//!
//! Each user namespace is a directory holding the uploaded files and a
//! dot-named JSON index. Quota usage is derived from the directory listing.

mod document_store;
mod namespace;
mod quota;

pub use document_store::{DocumentStore, NamespaceWriter};
pub use namespace::{is_service_file, CommittedFile, NamespaceHandle, StagedFile};
pub use quota::{QuotaDecision, QuotaGuard};

//! Provider abstractions for text extraction and embeddings
//!
//! Pipeline and search depend on these traits only, so tests and deployments
//! can swap implementations without touching either.

pub mod embedding;
pub mod extractor;
pub mod ollama;

pub use embedding::{checked_vector, EmbeddingProvider};
pub use extractor::TextExtractor;
pub use ollama::OllamaEmbedder;

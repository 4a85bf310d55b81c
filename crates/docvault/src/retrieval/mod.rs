//! Query validation and search over namespace indexes

mod search;
mod validate;

pub use search::{cosine_similarity, snippet, SearchEngine};
pub use validate::{clamp_top_k, validate_query};

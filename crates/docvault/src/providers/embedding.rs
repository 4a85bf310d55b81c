//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for generating text embeddings
///
/// Built once at startup and shared as `Arc<dyn EmbeddingProvider>`.
/// Implementations should return `Error::EmbeddingUnavailable` on failure;
/// callers treat it as non-fatal.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Expected vector length
    fn dimensions(&self) -> usize;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Accept a provider's vector only if it can be stored and compared
///
/// JSON has no NaN or infinity, so a non-finite component would be written to
/// the index as `null` and make it unreadable.
pub fn checked_vector(provider: &str, vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(Error::embedding(format!("{} returned an empty vector", provider)));
    }
    if let Some(i) = vector.iter().position(|v| !v.is_finite()) {
        return Err(Error::embedding(format!(
            "{} returned a non-finite value at component {}",
            provider, i
        )));
    }
    Ok(vector)
}

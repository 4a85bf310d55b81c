//! Application state for the vault server

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use crate::config::VaultConfig;
use crate::error::Result;
use crate::ingestion::{FileParser, IngestionPipeline};
use crate::providers::{EmbeddingProvider, OllamaEmbedder, TextExtractor};
use crate::retrieval::SearchEngine;
use crate::storage::DocumentStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: VaultConfig,
    /// Per-user files and indexes
    store: Arc<DocumentStore>,
    /// Upload handling
    pipeline: IngestionPipeline,
    /// Query handling
    search: SearchEngine,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create state with the built-in extractor and, if enabled, Ollama embeddings
    pub async fn new(config: VaultConfig) -> Result<Self> {
        tracing::info!("Initializing vault state (root: {})...", config.storage.root.display());

        let embedder: Option<Arc<dyn EmbeddingProvider>> = if config.embeddings.enabled {
            let embedder = OllamaEmbedder::new(&config.embeddings)?;
            match embedder.health_check().await {
                Ok(true) => tracing::info!(
                    "Embeddings via Ollama at {} (model {})",
                    config.embeddings.base_url,
                    embedder.model()
                ),
                _ => tracing::warn!(
                    "Ollama at {} is not reachable; ingests will index without vectors until it is",
                    config.embeddings.base_url
                ),
            }
            Some(Arc::new(embedder))
        } else {
            tracing::info!("Embeddings disabled, semantic search falls back to lexical");
            None
        };

        Self::with_providers(config, Arc::new(FileParser::new()), embedder)
    }

    /// Create state with explicit providers
    pub fn with_providers(
        config: VaultConfig,
        extractor: Arc<dyn TextExtractor>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(DocumentStore::new(&config.storage)?);
        let pipeline = IngestionPipeline::new(Arc::clone(&store), extractor, embedder.clone(), &config);
        let search = SearchEngine::new(
            Arc::clone(&store),
            embedder,
            config.search.clone(),
            Duration::from_secs(config.ingestion.embedding_timeout_secs),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                pipeline,
                search,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    /// Get the document store
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.inner.store
    }

    /// Get the ingestion pipeline
    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.inner.pipeline
    }

    /// Get the search engine
    pub fn search(&self) -> &SearchEngine {
        &self.inner.search
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}

//! Configuration for the document vault

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SearchMode;

/// Main vault configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage layout and quota
    #[serde(default)]
    pub storage: StorageConfig,
    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Ingestion policy
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// What happens to older index records when a filename is uploaded again
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep older records and append a new one
    #[default]
    Append,
    /// Drop older records for the same filename when appending
    Replace,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per user namespace
    pub root: PathBuf,
    /// Per-namespace byte ceiling (default: 50MB)
    pub quota_bytes: u64,
    /// Index file name inside each namespace; must start with '.'
    pub index_file_name: String,
    /// Re-upload handling
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use absolute path so the root does not depend on the working directory
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
            .join("docvault")
            .join("users");

        Self {
            root,
            quota_bytes: 50 * 1024 * 1024, // 50MB
            index_file_name: ".index.json".to_string(),
            duplicate_policy: DuplicatePolicy::Append,
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Snippet length in characters
    pub snippet_chars: usize,
    /// Results returned by semantic and hybrid search when the request omits top_k
    pub default_top_k: usize,
    /// Upper bound on a requested top_k
    pub max_top_k: usize,
    /// Longest accepted query
    pub max_query_chars: usize,
    /// Added to the semantic score of records that also match lexically
    pub lexical_boost: f32,
    /// Mode used when the request does not name one
    pub default_mode: SearchMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            snippet_chars: 200,
            default_top_k: 10,
            max_top_k: 100,
            max_query_chars: 500,
            lexical_boost: 1.0,
            default_mode: SearchMode::Lexical,
        }
    }
}

/// Embedding provider configuration (Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Create an embedding provider at startup
    pub enabled: bool,
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions (384 for MiniLM)
    pub dimensions: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Ingestion policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Reject the upload when extraction fails instead of keeping a sentinel record
    pub strict_extraction: bool,
    /// Deadline for a single extraction call
    pub extraction_timeout_secs: u64,
    /// Deadline for a single embedding call
    pub embedding_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            strict_extraction: false,
            extraction_timeout_secs: 60,
            embedding_timeout_secs: 30,
        }
    }
}

impl VaultConfig {
    /// Load configuration from an optional TOML file, then apply `DOCVAULT_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOCVAULT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_override(&lookup, "DOCVAULT_PORT") {
            self.server.port = port;
        }
        if let Some(root) = lookup("DOCVAULT_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(quota) = parse_override(&lookup, "DOCVAULT_QUOTA_BYTES") {
            self.storage.quota_bytes = quota;
        }
        if let Some(enabled) = parse_override(&lookup, "DOCVAULT_EMBEDDINGS_ENABLED") {
            self.embeddings.enabled = enabled;
        }
        if let Some(url) = lookup("DOCVAULT_EMBEDDINGS_URL") {
            self.embeddings.base_url = url;
        }
        if let Some(strict) = parse_override(&lookup, "DOCVAULT_STRICT_EXTRACTION") {
            self.ingestion.strict_extraction = strict;
        }
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storage.quota_bytes == 0 {
            return Err(Error::Config("storage.quota_bytes must be greater than 0".to_string()));
        }
        if !self.storage.index_file_name.starts_with('.')
            || self.storage.index_file_name.contains(|c| c == '/' || c == '\\')
        {
            return Err(Error::Config(format!(
                "storage.index_file_name must be a dot-file name, got '{}'",
                self.storage.index_file_name
            )));
        }
        if self.search.snippet_chars == 0 {
            return Err(Error::Config("search.snippet_chars must be greater than 0".to_string()));
        }
        if self.search.default_top_k == 0 || self.search.max_top_k == 0 {
            return Err(Error::Config("search top_k limits must be greater than 0".to_string()));
        }
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

//! Error types for the document vault

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Vault errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Incoming write would cross the namespace quota ceiling
    #[error("Quota exceeded for '{namespace}': {used} bytes used + {incoming} incoming > {ceiling} bytes allowed")]
    QuotaExceeded {
        namespace: String,
        used: u64,
        incoming: u64,
        ceiling: u64,
    },

    /// Failure persisting file bytes or index state
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index file exists but cannot be decoded
    #[error("Index for '{namespace}' is corrupt: {message}")]
    IndexCorrupt { namespace: String, message: String },

    /// Text extraction failed
    #[error("Failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding provider missing, failing, or timed out
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// User identifier is not a valid namespace
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Filename cannot be stored
    #[error("Invalid filename: {0}")]
    InvalidFileName(String),

    /// Search query failed validation
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Malformed request (missing header, unreadable upload)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for failures the caller caused (bad input), as opposed to service faults
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidNamespace(_)
                | Error::InvalidFileName(_)
                | Error::InvalidQuery(_)
                | Error::InvalidRequest(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::QuotaExceeded { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "quota_exceeded"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::IndexCorrupt { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "index_corrupt"),
            Error::Extraction { .. } => (StatusCode::BAD_REQUEST, "extraction_error"),
            Error::UnsupportedFileType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_type")
            }
            Error::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            Error::InvalidNamespace(_) => (StatusCode::BAD_REQUEST, "invalid_namespace"),
            Error::InvalidFileName(_) => (StatusCode::BAD_REQUEST, "invalid_filename"),
            Error::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

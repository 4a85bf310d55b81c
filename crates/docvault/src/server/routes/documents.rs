//! Document upload and listing endpoints

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use super::UserId;
use crate::error::{Error, Result};
use crate::ingestion::IngestRequest;
use crate::server::state::AppState;
use crate::types::{IngestResponse, StoredFileInfo, StoredFileName};

/// Multipart field holding the upload
const FILE_FIELD: &str = "file";

/// Files stored for a user
#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub files: Vec<StoredFileInfo>,
    pub count: usize,
}

/// POST /api/documents - Upload and ingest one file
pub async fn upload_document(
    State(state): State<AppState>,
    UserId(namespace): UserId,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidFileName("upload has no filename".to_string()))?;
        let filename = StoredFileName::parse(filename)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("Failed to read upload: {}", e)))?;

        tracing::info!("[{}] upload {} ({} bytes)", namespace, filename, data.len());

        let outcome = state
            .pipeline()
            .ingest(IngestRequest::new(namespace, filename, data.to_vec()))
            .await?;
        return Ok(Json(outcome));
    }

    Err(Error::InvalidRequest(format!(
        "multipart body has no '{}' field",
        FILE_FIELD
    )))
}

/// GET /api/documents - List stored files with their index state
pub async fn list_documents(
    State(state): State<AppState>,
    UserId(namespace): UserId,
) -> Result<Json<DocumentList>> {
    let files = state.store().list_files(&namespace).await?;
    Ok(Json(DocumentList {
        count: files.len(),
        files,
    }))
}

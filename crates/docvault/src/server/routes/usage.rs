//! Quota usage and embedding maintenance endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use super::UserId;
use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::QuotaGuard;
use crate::types::QuotaStatus;

/// Result of a backfill run
#[derive(Debug, Serialize)]
pub struct BackfillResponse {
    pub updated: usize,
}

/// GET /api/usage
pub async fn get_usage(
    State(state): State<AppState>,
    UserId(namespace): UserId,
) -> Result<Json<QuotaStatus>> {
    let handle = state.store().namespace(&namespace);
    let status = QuotaGuard::status(&handle, state.config().storage.quota_bytes).await?;
    Ok(Json(status))
}

/// POST /api/embeddings/backfill
pub async fn backfill_embeddings(
    State(state): State<AppState>,
    UserId(namespace): UserId,
) -> Result<Json<BackfillResponse>> {
    let updated = state.pipeline().backfill_embeddings(&namespace).await?;
    Ok(Json(BackfillResponse { updated }))
}

//! Search endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::UserId;
use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{SearchMode, SearchRequest, SearchResponse};

/// Query-string form of a search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "query")]
    pub q: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

impl SearchParams {
    fn into_request(self) -> Result<SearchRequest> {
        let mode = self
            .mode
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.parse::<SearchMode>())
            .transpose()?;

        Ok(SearchRequest {
            query: self.q,
            mode,
            top_k: self.top_k,
        })
    }
}

/// GET /api/search?q=&mode=&top_k=
pub async fn search_get(
    State(state): State<AppState>,
    UserId(namespace): UserId,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let request = params.into_request()?;
    Ok(Json(state.search().search(&namespace, &request).await?))
}

/// POST /api/search with a JSON `SearchRequest`
pub async fn search_post(
    State(state): State<AppState>,
    UserId(namespace): UserId,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    Ok(Json(state.search().search(&namespace, &request).await?))
}

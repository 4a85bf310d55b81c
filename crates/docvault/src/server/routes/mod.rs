//! API routes for the vault server

pub mod documents;
pub mod search;
pub mod usage;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::request::Parts,
    routing::{get, post},
    Router,
};

use crate::error::Error;
use crate::server::state::AppState;
use crate::types::UserNamespace;

/// Header carrying the caller's identity
pub const USER_ID_HEADER: &str = "user-id";
/// Accepted alternative to [`USER_ID_HEADER`]
pub const USER_ID_HEADER_ALT: &str = "x-user-id";

/// Namespace of the caller, taken from the `user-id` header
///
/// Identity only; authentication happens upstream of this service.
#[derive(Debug, Clone)]
pub struct UserId(pub UserNamespace);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .or_else(|| parts.headers.get(USER_ID_HEADER_ALT))
            .ok_or_else(|| Error::InvalidRequest(format!("missing '{}' header", USER_ID_HEADER)))?;

        let raw = value
            .to_str()
            .map_err(|_| Error::InvalidNamespace("user identifier is not valid text".to_string()))?;

        Ok(Self(UserNamespace::parse(raw)?))
    }
}

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Upload with larger body limit
        .route(
            "/documents",
            post(documents::upload_document)
                .layer(DefaultBodyLimit::max(max_upload_size))
                .get(documents::list_documents),
        )
        .route("/search", get(search::search_get).post(search::search_post))
        .route("/usage", get(usage::get_usage))
        .route("/embeddings/backfill", post(usage::backfill_embeddings))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "docvault",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Per-user document storage with quota enforcement and search",
        "endpoints": {
            "POST /api/documents": "Upload a file (multipart field 'file')",
            "GET /api/documents": "List stored files and their index state",
            "GET /api/search": "Search (?q=&mode=&top_k=)",
            "POST /api/search": "Search with a JSON body",
            "GET /api/usage": "Quota usage",
            "POST /api/embeddings/backfill": "Embed records that have no vector"
        },
        "identity_header": USER_ID_HEADER
    }))
}

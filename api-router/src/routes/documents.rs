use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use common::storage::types::text_chunk::DocumentMeta;
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_identity::RequestIdentity};

/// A source document, either pre-split into `chunks` or as raw `text`.
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    #[serde(default)]
    pub chunks: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn index_document(
    State(state): State<ApiState>,
    Extension(identity): Extension<RequestIdentity>,
    Json(input): Json<DocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        session_id = %identity.session_id,
        document_id = %input.meta.document_id,
        chunk_count = input.chunks.len(),
        has_text = input.text.is_some(),
        "Received document"
    );

    let report = match (input.chunks.is_empty(), input.text) {
        (false, None) => state.indexer.index_document(input.meta, input.chunks).await?,
        (true, Some(text)) => state.indexer.index_text(input.meta, &text).await?,
        (false, Some(_)) => {
            return Err(ApiError::ValidationError(
                "send either chunks or text, not both".to_string(),
            ))
        }
        (true, None) => {
            return Err(ApiError::ValidationError(
                "document has no chunks or text".to_string(),
            ))
        }
    };

    Ok((StatusCode::CREATED, Json(report)))
}

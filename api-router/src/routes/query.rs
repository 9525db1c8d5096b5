use agent_pipeline::{Query, QueryFilters};
use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::Deserialize;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_identity::RequestIdentity};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub filters: QueryFilters,
}

pub async fn answer_query(
    State(state): State<ApiState>,
    Extension(identity): Extension<RequestIdentity>,
    Json(input): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.query.trim().is_empty() {
        return Err(ApiError::ValidationError("query must not be empty".to_string()));
    }

    info!(
        session_id = %identity.session_id,
        query_bytes = input.query.len(),
        filtered = !input.filters.is_empty(),
        "Received query"
    );

    let query = Query::new(input.query, identity.session_id).with_filters(input.filters);
    let response = state
        .query_service
        .handle(&identity.account, &query)
        .await?;

    Ok(Json(response))
}

use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::{api_state::ApiState, error::ApiError, middleware_identity::RequestIdentity};

pub async fn get_balance(
    State(state): State<ApiState>,
    Extension(identity): Extension<RequestIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.ledger().balance(&identity.account).await?;

    Ok(Json(balance))
}

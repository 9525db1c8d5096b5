use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::api_state::ApiState;

/// Liveness check: the process is up and serving requests.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Readiness check: 200 once the database answers, 503 otherwise.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let db_check = match state.db.client.query("RETURN true").await {
        Ok(response) => response.check().map(|_| ()),
        Err(err) => Err(err),
    };

    match db_check {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok" }
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "checks": { "db": "fail" },
                    "reason": e.to_string()
                })),
            )
        }
    }
}

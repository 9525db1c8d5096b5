use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use middleware_identity::require_identity;
use routes::{
    balance::get_balance,
    documents::index_document,
    health::{live, ready},
    query::answer_query,
};

pub mod api_state;
pub mod error;
pub mod middleware_identity;
mod routes;

const DOCUMENT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public health endpoints for k8s/systemd
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Everything else is billed or attributed to a session
    let identified = Router::new()
        .route("/query", post(answer_query))
        .route("/balance", get(get_balance))
        .route(
            "/documents",
            post(index_document).layer(DefaultBodyLimit::max(DOCUMENT_BODY_LIMIT)),
        )
        .route_layer(from_fn(require_identity));

    public.merge(identified)
}

use axum::{extract::Request, middleware::Next, response::Response};
use common::storage::types::credit_account::AccountIdentity;

use crate::error::ApiError;

pub const SESSION_HEADER: &str = "X-Session-Id";
pub const USER_HEADER: &str = "X-User-Id";

/// Who is asking. Signed-in users are billed on their user account, everyone else per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub session_id: String,
    pub account: AccountIdentity,
}

pub async fn require_identity(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let identity = extract_identity(&request)
        .ok_or_else(|| ApiError::Unauthorized(format!("{SESSION_HEADER} header is required")))?;

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

fn extract_identity(request: &Request) -> Option<RequestIdentity> {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    let session_id = header(SESSION_HEADER)?;
    let account = match header(USER_HEADER) {
        Some(user_id) => AccountIdentity::User(user_id),
        None => AccountIdentity::Session(session_id.clone()),
    };
    Some(RequestIdentity {
        session_id,
        account,
    })
}

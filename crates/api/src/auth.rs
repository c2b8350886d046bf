//! Operator authentication
//!
//! Back-office routes (sending invites, cancelling authorizations, the
//! invariant report) are protected by a single configured bearer token. An
//! empty configured token rejects everything: the routes fail closed rather
//! than open when the deployment forgot to set it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

/// Constant-time token equality. Never matches when the expected side is
/// empty.
pub fn token_matches(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Middleware guarding operator routes.
pub async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = extract_bearer_token(&request).ok_or(ApiError::Unauthorized)?;
    if !token_matches(&state.config.operator_token, provided) {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

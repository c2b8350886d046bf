//! Gateway webhook route
//!
//! Asaas redelivers until it sees a 2xx, so every recognized delivery is
//! acknowledged with 200 no matter what it did to local state (duplicates,
//! unknown references, and event types we ignore included). The only
//! non-success answers are 401 (bad shared secret) and 400 (undecodable
//! body).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use pauta_billing::{Notification, WebhookPayload};

use crate::auth::token_matches;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const WEBHOOK_TOKEN_HEADER: &str = "asaas-access-token";

/// POST /webhooks/gateway
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    // An empty configured token disables the check; Asaas webhook secrets
    // are optional in sandbox setups.
    if !state.config.webhook_token.is_empty() {
        let provided = headers
            .get(WEBHOOK_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !token_matches(&state.config.webhook_token, provided) {
            return Err(ApiError::Unauthorized);
        }
    }

    let payload: WebhookPayload = serde_json::from_str(&body)
        .map_err(|_| ApiError::BadRequest("invalid payload".to_string()))?;

    let notification = Notification::from_payload(&payload);
    let disposition = state.billing.reconciler.process(&notification).await?;

    tracing::debug!(event = %notification.event, disposition = ?disposition, "webhook handled");
    Ok(Json(json!({ "message": "ok" })))
}

//! Operator routes acting on a business record

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use pauta_billing::{BillingError, SentInvite};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn business_error(e: BillingError) -> ApiError {
    match e {
        BillingError::NotFound => ApiError::NotFound("negócio não encontrado".to_string()),
        other => other.into(),
    }
}

/// POST /businesses/{id}/invites:send
///
/// Generates a fresh invite token and delivers the link to the client's
/// phone. Re-sending replaces any previously delivered link.
pub async fn send_invite(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SentInvite>> {
    let invites = state
        .billing
        .invites
        .as_ref()
        .ok_or_else(ApiError::payments_not_configured)?;

    let sent = invites.send(id).await.map_err(business_error)?;
    Ok(Json(sent))
}

/// POST /businesses/{id}/authorization:cancel
pub async fn cancel_authorization(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let invites = state
        .billing
        .invites
        .as_ref()
        .ok_or_else(ApiError::payments_not_configured)?;

    invites.cancel(id).await.map_err(business_error)?;
    Ok(Json(json!({ "message": "assinatura cancelada" })))
}

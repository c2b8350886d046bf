//! Public invite routes
//!
//! Both routes are keyed only by the invite token; there is no session. The
//! token is a 256-bit random value, which is the whole access control.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use pauta_billing::{AcceptedInvite, BillingError, InvitePreview};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    #[serde(rename = "taxId")]
    pub tax_id: String,
}

/// Invite lookups answer "convite não encontrado" rather than the generic
/// not-found text.
fn invite_error(e: BillingError) -> ApiError {
    match e {
        BillingError::NotFound => ApiError::NotFound("convite não encontrado".to_string()),
        other => other.into(),
    }
}

/// GET /invites/{token}
///
/// Renders the invite page data. Works without a configured gateway; the
/// stored QR payload is included only once the invite is accepted.
pub async fn get_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<InvitePreview>> {
    let preview = state
        .billing
        .invite_preview(&token)
        .await
        .map_err(invite_error)?;
    Ok(Json(preview))
}

/// POST /invites/{token}/accept
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<AcceptRequest>,
) -> ApiResult<Json<AcceptedInvite>> {
    let invites = state
        .billing
        .invites
        .as_ref()
        .ok_or_else(ApiError::payments_not_configured)?;

    let accepted = invites
        .accept(&token, &body.tax_id)
        .await
        .map_err(invite_error)?;
    Ok(Json(accepted))
}

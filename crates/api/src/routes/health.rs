//! Liveness and operator health routes

use axum::extract::State;
use axum::Json;
use serde_json::json;

use pauta_billing::InvariantCheckSummary;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/admin/billing/invariants
///
/// Runs the read-only consistency checks and returns the full report. The
/// stuck-`charge_pending` check here is the operational signal for the one
/// condition the engine cannot self-heal.
pub async fn billing_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = state.billing.invariants.run_all_checks().await?;

    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            "billing invariant check found violations"
        );
    }

    Ok(Json(summary))
}

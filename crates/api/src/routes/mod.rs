//! Route handlers and router assembly

pub mod businesses;
pub mod health;
pub mod invites;
pub mod webhooks;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::require_operator;
use crate::state::AppState;

/// Build the application router.
///
/// The invite and webhook routes are public: the invite token is the
/// credential for the first two, the shared-secret header for the third.
/// Everything else is operator-only.
pub fn create_router(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route(
            "/businesses/{id}/invites:send",
            post(businesses::send_invite),
        )
        .route(
            "/businesses/{id}/authorization:cancel",
            post(businesses::cancel_authorization),
        )
        .route(
            "/api/admin/billing/invariants",
            get(health::billing_invariants),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_operator,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/invites/{token}", get(invites::get_invite))
        .route("/invites/{token}/accept", post(invites::accept_invite))
        .route("/webhooks/gateway", post(webhooks::gateway_webhook))
        .merge(operator_routes)
        .with_state(state)
}

//! Billing error types

use crate::gateway::GatewayError;

pub type BillingResult<T> = Result<T, BillingError>;

/// Which gateway call failed. Carried alongside [`GatewayError`] so callers
/// can report the failed operation without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOp {
    CreateCustomer,
    CreateAuthorization,
    CancelAuthorization,
    CreateCharge,
}

impl GatewayOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOp::CreateCustomer => "create_customer",
            GatewayOp::CreateAuthorization => "create_authorization",
            GatewayOp::CancelAuthorization => "cancel_authorization",
            GatewayOp::CreateCharge => "create_charge",
        }
    }
}

impl std::fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// No record matches the supplied token or id.
    #[error("business not found")]
    NotFound,

    /// The invite exists but was sent more than the allowed window ago.
    #[error("invite expired")]
    InviteExpired,

    /// The subscription is already active.
    #[error("subscription already active")]
    AlreadyActive,

    /// The invite was already accepted, or the subscription is active;
    /// re-sending would invalidate a live authorization.
    #[error("invite already accepted")]
    AlreadyAccepted,

    /// A concurrent accept holds the claim on this invite.
    #[error("invite claim held by another request")]
    ClaimConflict,

    /// The record is not in a state this operation applies to.
    #[error("operation not allowed in state {0}")]
    InvalidState(&'static str),

    /// Cancel was requested but there is no active subscription to cancel.
    #[error("no active subscription")]
    NoActiveSubscription,

    /// The stored tier/commitment pair has no pricing table entry.
    #[error("invalid tier/commitment combination")]
    InvalidPlan,

    /// Request data failed validation before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A gateway call failed; no partial state was left behind.
    #[error("gateway {op} failed: {source}")]
    Gateway {
        op: GatewayOp,
        #[source]
        source: GatewayError,
    },

    /// The messaging relay could not deliver the invite link.
    #[error("message delivery failed: {0}")]
    Delivery(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl BillingError {
    pub fn gateway(op: GatewayOp, source: GatewayError) -> Self {
        BillingError::Gateway { op, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_op_display() {
        assert_eq!(GatewayOp::CreateCustomer.to_string(), "create_customer");
        assert_eq!(
            GatewayOp::CancelAuthorization.to_string(),
            "cancel_authorization"
        );
    }

    #[test]
    fn test_gateway_error_keeps_op() {
        let err = BillingError::gateway(
            GatewayOp::CreateCharge,
            GatewayError::Api {
                status: 400,
                message: "invalid customer".to_string(),
            },
        );
        match err {
            BillingError::Gateway { op, .. } => assert_eq!(op, GatewayOp::CreateCharge),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}

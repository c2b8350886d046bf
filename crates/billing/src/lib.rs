// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pauta Billing Module
//!
//! Subscription lifecycle and payment reconciliation against the Asaas
//! Pix Automático gateway. One record per client business carries all
//! billing state; three flows own every transition on it.
//!
//! ## Features
//!
//! - **Invite Acceptance**: one-time invite link becomes a recurring payment
//!   authorization exactly once, however many times the form is submitted
//! - **Charge Scheduling**: periodic scan creates one charge per billing
//!   period ahead of the due date, guarded by a per-record claim flag
//! - **Webhook Reconciliation**: gateway notifications advance subscription
//!   state, tolerating duplicates, reordering, and unknown events
//! - **Consistency Checks**: runnable read-only queries that surface stuck
//!   or contradictory records for operators

pub mod charges;
pub mod error;
pub mod gateway;
pub mod invariants;
pub mod invites;
pub mod mocks;
pub mod pricing;
pub mod store;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Charge scheduling
pub use charges::{ChargeRunSummary, ChargeScheduler, CHARGE_LOOKAHEAD_DAYS};

// Error
pub use error::{BillingError, BillingResult, GatewayOp};

// Gateway
pub use gateway::{
    AsaasConfig, AsaasGateway, Authorization, AuthorizationRequest, ChargeRequest, Customer,
    GatewayError, Payment, PaymentGateway, QrCodeRequest, BILLING_TYPE_PIX,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Invites
pub use invites::{
    preview_invite, AcceptedInvite, InvitePreview, InviteService, LogRelay, MessagingRelay,
    SentInvite, INVITE_TTL_DAYS,
};

// Pricing
pub use pricing::{cycle_months, frequency, next_cycle_date, plan_summary, price_for};

// Store
pub use store::{Business, PgSubscriptionStore, SubscriptionStore};

// Webhooks
pub use webhooks::{Disposition, EventKind, Notification, WebhookPayload, WebhookReconciler};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    /// Record store handle; always available, gateway or not.
    pub store: Arc<dyn SubscriptionStore>,
    /// Gateway-backed invite flow; `None` when no gateway key is configured.
    pub invites: Option<Arc<InviteService>>,
    /// Gateway-backed charge scheduling; `None` when no gateway key is configured.
    pub charges: Option<Arc<ChargeScheduler>>,
    pub reconciler: Arc<WebhookReconciler>,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables.
    ///
    /// Reads `ASAAS_API_KEY`, `ASAAS_SANDBOX`, and `APP_URL`. Without an API
    /// key the gateway-backed flows stay disabled while webhook reconciliation
    /// and consistency checks keep working; the process still serves traffic.
    pub fn from_env(pool: PgPool) -> Self {
        let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool.clone()));
        let reconciler = Arc::new(WebhookReconciler::new(store.clone()));
        let invariants = InvariantChecker::new(pool);

        let Some(config) = AsaasConfig::from_env() else {
            tracing::warn!("ASAAS_API_KEY not set, payment operations disabled");
            return Self {
                store,
                invites: None,
                charges: None,
                reconciler,
                invariants,
            };
        };

        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let gateway: Arc<dyn PaymentGateway> = Arc::new(AsaasGateway::new(config));
        let relay: Arc<dyn MessagingRelay> = Arc::new(LogRelay);

        Self {
            store: store.clone(),
            invites: Some(Arc::new(InviteService::new(
                store.clone(),
                gateway.clone(),
                relay,
                app_url,
            ))),
            charges: Some(Arc::new(ChargeScheduler::new(store, gateway))),
            reconciler,
            invariants,
        }
    }

    /// Invite page preview; works with or without a configured gateway.
    pub async fn invite_preview(&self, token: &str) -> BillingResult<InvitePreview> {
        invites::preview_invite(self.store.as_ref(), token).await
    }

    /// Create a new billing service with an explicit gateway config
    pub fn new(config: AsaasConfig, app_url: String, pool: PgPool) -> Self {
        let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(pool.clone()));
        let gateway: Arc<dyn PaymentGateway> = Arc::new(AsaasGateway::new(config));
        let relay: Arc<dyn MessagingRelay> = Arc::new(LogRelay);

        Self {
            store: store.clone(),
            invites: Some(Arc::new(InviteService::new(
                store.clone(),
                gateway.clone(),
                relay,
                app_url,
            ))),
            charges: Some(Arc::new(ChargeScheduler::new(store.clone(), gateway))),
            reconciler: Arc::new(WebhookReconciler::new(store)),
            invariants: InvariantChecker::new(pool),
        }
    }
}

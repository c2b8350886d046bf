//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use pauta_billing::BillingService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing engine. Invite acceptance and charge scheduling are disabled
    /// inside it when no gateway key is configured; webhook reconciliation
    /// and consistency checks always run.
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = Arc::new(BillingService::from_env(pool.clone()));
        if billing.invites.is_some() {
            tracing::info!("Billing service initialized with payment gateway");
        } else {
            tracing::warn!("Billing service initialized without payment gateway");
        }

        Self {
            pool,
            config,
            billing,
        }
    }
}

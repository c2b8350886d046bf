//! API server configuration

use anyhow::Context;

/// Server configuration, loaded once at startup.
///
/// Gateway credentials (`ASAAS_API_KEY`, `ASAAS_SANDBOX`) and the invite
/// link base (`APP_URL`) are read by the billing service itself; this struct
/// carries only what the HTTP layer needs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the server binds to, e.g. `0.0.0.0:8080`.
    pub bind_address: String,
    /// Postgres connection string.
    pub database_url: String,
    /// Shared secret Asaas sends in the `asaas-access-token` header.
    /// Empty disables webhook authentication (local development only).
    pub webhook_token: String,
    /// Bearer token for back-office routes. Empty rejects all operator
    /// requests.
    pub operator_token: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let webhook_token = std::env::var("ASAAS_WEBHOOK_TOKEN").unwrap_or_default();
        let operator_token = std::env::var("OPERATOR_TOKEN").unwrap_or_default();

        if webhook_token.is_empty() {
            tracing::warn!("ASAAS_WEBHOOK_TOKEN not set, webhook authentication disabled");
        }
        if operator_token.is_empty() {
            tracing::warn!("OPERATOR_TOKEN not set, operator routes will reject all requests");
        }

        Ok(Self {
            bind_address,
            database_url,
            webhook_token,
            operator_token,
        })
    }
}

//! Invite lifecycle: send, preview, accept, cancel
//!
//! Acceptance is the one flow where a browser action creates money movement,
//! so it is built around a single-record claim: the `invited -> accepted`
//! transition is a compare-and-set, and only the caller that wins it talks
//! to the gateway. Everyone else gets the stored result or a conflict.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use pauta_shared::InviteStatus;

use crate::error::{BillingError, BillingResult, GatewayOp};
use crate::gateway::{iso_date, AuthorizationRequest, PaymentGateway, QrCodeRequest};
use crate::pricing;
use crate::store::{Business, SubscriptionStore};

/// Invites expire this many days after being sent. Derived from
/// `invite_sent_at` on every read, never stored.
pub const INVITE_TTL_DAYS: i64 = 7;

/// The QR code presented at acceptance is valid for 24 hours.
const QR_EXPIRATION_SECONDS: i64 = 86_400;

/// Port for the component that delivers invite links to clients.
#[async_trait]
pub trait MessagingRelay: Send + Sync {
    async fn send_text(&self, phone: &str, text: &str) -> BillingResult<()>;
}

/// Relay that writes the message to the log instead of delivering it, for
/// deployments without a messaging integration.
pub struct LogRelay;

#[async_trait]
impl MessagingRelay for LogRelay {
    async fn send_text(&self, phone: &str, text: &str) -> BillingResult<()> {
        tracing::info!(phone = %phone, text = %text, "invite message (log relay)");
        Ok(())
    }
}

/// What the public invite page renders.
///
/// Tier and commitment stay raw strings here: an invited record always holds
/// a valid pair, but the page should still render if it somehow does not.
#[derive(Debug, Clone, Serialize)]
pub struct InvitePreview {
    pub business_name: String,
    pub client_name: String,
    pub invite_status: String,
    pub tier: String,
    pub commitment: String,
    pub price: f64,
    pub commitment_months: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentInvite {
    pub invite_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvite {
    pub qr_payload: String,
}

/// Service owning the invite flows.
pub struct InviteService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    relay: Arc<dyn MessagingRelay>,
    app_url: String,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
        relay: Arc<dyn MessagingRelay>,
        app_url: String,
    ) -> Self {
        Self {
            store,
            gateway,
            relay,
            app_url,
        }
    }

    /// Generate a fresh invite token, deliver the link, and move the record
    /// to `invited`. Re-sending replaces the token, which invalidates any
    /// previously delivered link.
    pub async fn send(&self, business_id: Uuid) -> BillingResult<SentInvite> {
        let business = self
            .store
            .find_by_id(business_id)
            .await?
            .ok_or(BillingError::NotFound)?;

        if business.phone.is_empty() {
            return Err(BillingError::Validation(
                "cliente sem telefone cadastrado".to_string(),
            ));
        }
        if business.plan().is_none() {
            return Err(BillingError::InvalidPlan);
        }
        match business.status() {
            InviteStatus::Accepted | InviteStatus::Active => {
                return Err(BillingError::AlreadyAccepted)
            }
            _ => {}
        }

        let token = generate_token();
        let invite_url = format!("{}/convite/{}", self.app_url, token);
        let text = format!(
            "Oi {}! Segue o link pra ativar seu acesso ao Pauta: {}",
            business.client_name, invite_url
        );

        self.relay.send_text(&business.phone, &text).await?;
        self.store
            .mark_invited(business_id, &token, OffsetDateTime::now_utc())
            .await?;

        tracing::info!(business_id = %business_id, "invite sent");
        Ok(SentInvite { invite_url })
    }

    /// What the invite page shows for a token. `InviteExpired` past the TTL.
    pub async fn fetch(&self, token: &str) -> BillingResult<InvitePreview> {
        preview_invite(self.store.as_ref(), token).await
    }

    /// Accept an invite: claim the record, provision the gateway customer,
    /// create the recurring authorization, and return the payable QR payload.
    ///
    /// Exactly one concurrent caller performs the gateway sequence; the rest
    /// see the stored payload (finished) or `ClaimConflict` (in flight).
    pub async fn accept(&self, token: &str, tax_id: &str) -> BillingResult<AcceptedInvite> {
        if tax_id.trim().is_empty() {
            return Err(BillingError::Validation(
                "CPF/CNPJ é obrigatório".to_string(),
            ));
        }

        let business = self
            .store
            .find_by_token(token)
            .await?
            .ok_or(BillingError::NotFound)?;

        if invite_expired(&business, OffsetDateTime::now_utc()) {
            return Err(BillingError::InviteExpired);
        }

        match business.status() {
            // Finished acceptance: replay the stored payload, no gateway call.
            InviteStatus::Accepted if !business.authorization_id.is_empty() => {
                return Ok(AcceptedInvite {
                    qr_payload: business.qr_payload,
                })
            }
            // Another request holds the claim and has not finished.
            InviteStatus::Accepted => return Err(BillingError::ClaimConflict),
            InviteStatus::Active => return Err(BillingError::AlreadyActive),
            InviteStatus::Invited => {}
            other => return Err(BillingError::InvalidState(other.as_str())),
        }

        let (tier, commitment) = business.plan().ok_or(BillingError::InvalidPlan)?;
        let price = pricing::price_for(tier, commitment);
        let terms = pricing::plan_summary(tier, commitment);

        // Atomic claim: exactly one concurrent request transitions
        // invited -> accepted; the accepted terms ride in the same write.
        if !self
            .store
            .claim_invite(token, OffsetDateTime::now_utc(), &terms)
            .await?
        {
            // A concurrent request claimed it. Check whether it finished.
            if let Some(fresh) = self.store.find_by_token(token).await? {
                if !fresh.authorization_id.is_empty() {
                    return Ok(AcceptedInvite {
                        qr_payload: fresh.qr_payload,
                    });
                }
            }
            return Err(BillingError::ClaimConflict);
        }

        // Claim held from here on. Reuse the gateway customer from a prior
        // attempt where authorization creation failed after customer creation
        // succeeded.
        let customer_id = if business.customer_id.is_empty() {
            let customer = match self
                .gateway
                .create_customer(&business.client_name, &business.client_email, tax_id)
                .await
            {
                Ok(customer) => customer,
                Err(e) => {
                    tracing::error!(business_id = %business.id, error = %e, "asaas create customer failed");
                    self.rollback_claim(business.id).await;
                    return Err(BillingError::gateway(GatewayOp::CreateCustomer, e));
                }
            };
            // Persist immediately so a retry after a crash reuses it.
            self.store.set_customer_id(business.id, &customer.id).await?;
            customer.id
        } else {
            business.customer_id.clone()
        };

        let due_date = iso_date(OffsetDateTime::now_utc().date());
        let request = AuthorizationRequest {
            customer_id: customer_id.clone(),
            description: format!("Pauta - {tier}"),
            frequency: pricing::frequency(commitment).to_string(),
            contract_id: business.id.to_string(),
            start_date: due_date.clone(),
            immediate_qr_code: QrCodeRequest {
                value: price,
                original_value: price,
                due_date,
                expiration_seconds: QR_EXPIRATION_SECONDS,
            },
        };

        let authorization = match self.gateway.create_authorization(request).await {
            Ok(authorization) => authorization,
            Err(e) => {
                tracing::error!(business_id = %business.id, error = %e, "asaas create authorization failed");
                self.rollback_claim(business.id).await;
                return Err(BillingError::gateway(GatewayOp::CreateAuthorization, e));
            }
        };

        self.store
            .store_authorization(
                business.id,
                &customer_id,
                &authorization.id,
                &authorization.payload,
            )
            .await?;

        tracing::info!(
            business_id = %business.id,
            authorization_id = %authorization.id,
            "invite accepted, authorization created"
        );

        Ok(AcceptedInvite {
            qr_payload: authorization.payload,
        })
    }

    /// Cancel an active subscription's authorization at the gateway, then
    /// mark the record cancelled.
    pub async fn cancel(&self, business_id: Uuid) -> BillingResult<()> {
        let business = self
            .store
            .find_by_id(business_id)
            .await?
            .ok_or(BillingError::NotFound)?;

        if business.authorization_id.is_empty() || business.status() != InviteStatus::Active {
            return Err(BillingError::NoActiveSubscription);
        }

        if let Err(e) = self
            .gateway
            .cancel_authorization(&business.authorization_id)
            .await
        {
            tracing::error!(business_id = %business_id, error = %e, "asaas cancel authorization failed");
            return Err(BillingError::gateway(GatewayOp::CancelAuthorization, e));
        }

        self.store.mark_cancelled(business_id).await?;
        tracing::info!(business_id = %business_id, "subscription cancelled");
        Ok(())
    }

    /// Best-effort rollback to `invited` after a gateway failure mid-accept.
    /// Only applies while the record is still `accepted`, so a webhook that
    /// landed in between is not clobbered.
    async fn rollback_claim(&self, business_id: Uuid) {
        if let Err(e) = self.store.revert_to_invited(business_id).await {
            tracing::error!(business_id = %business_id, error = %e, "rollback to invited failed");
        }
    }
}

/// Build the invite page preview for a token, or `InviteExpired` past the
/// TTL. A free function over the store rather than a service method: the
/// read path has no gateway dependency and keeps working when no gateway
/// credentials are configured.
pub async fn preview_invite(
    store: &dyn SubscriptionStore,
    token: &str,
) -> BillingResult<InvitePreview> {
    let business = store
        .find_by_token(token)
        .await?
        .ok_or(BillingError::NotFound)?;

    if invite_expired(&business, OffsetDateTime::now_utc()) {
        return Err(BillingError::InviteExpired);
    }

    let (price, months) = business
        .plan()
        .map(|(tier, commitment)| {
            (
                pricing::price_for(tier, commitment),
                pricing::cycle_months(commitment),
            )
        })
        .unwrap_or((0.0, 0));

    let qr_payload =
        (business.status() == InviteStatus::Accepted).then(|| business.qr_payload.clone());

    Ok(InvitePreview {
        business_name: business.name,
        client_name: business.client_name,
        invite_status: business.invite_status,
        tier: business.tier,
        commitment: business.commitment,
        price,
        commitment_months: months,
        qr_payload,
    })
}

fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn invite_expired(business: &Business, now: OffsetDateTime) -> bool {
    match business.invite_sent_at {
        Some(sent_at) => now - sent_at > time::Duration::days(INVITE_TTL_DAYS),
        None => true,
    }
}

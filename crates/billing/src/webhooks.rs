//! Gateway webhook reconciliation
//!
//! Asaas delivers Pix Automático lifecycle events at least once and in no
//! guaranteed order, so every transition here is a conditional store update:
//! a duplicate or out-of-order delivery finds the record already past the
//! required state and lands as a no-op. Events that reference no known
//! record, and event types we do not handle, are acknowledged without any
//! write so the gateway stops redelivering them.

use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::pricing::next_cycle_date;
use crate::store::SubscriptionStore;

pub const EVENT_AUTHORIZATION_ACTIVATED: &str = "PIX_AUTOMATIC_RECURRING_AUTHORIZATION_ACTIVATED";
pub const EVENT_AUTHORIZATION_REFUSED: &str = "PIX_AUTOMATIC_RECURRING_AUTHORIZATION_REFUSED";
pub const EVENT_AUTHORIZATION_CANCELLED: &str = "PIX_AUTOMATIC_RECURRING_AUTHORIZATION_CANCELLED";
pub const EVENT_AUTHORIZATION_EXPIRED: &str = "PIX_AUTOMATIC_RECURRING_AUTHORIZATION_EXPIRED";
pub const EVENT_PAYMENT_CONFIRMED: &str = "PAYMENT_CONFIRMED";
pub const EVENT_PAYMENT_REFUSED: &str = "PIX_AUTOMATIC_RECURRING_PAYMENT_INSTRUCTION_REFUSED";
pub const EVENT_PAYMENT_CANCELLED: &str = "PIX_AUTOMATIC_RECURRING_PAYMENT_INSTRUCTION_CANCELLED";

/// Raw webhook body as Asaas posts it. Either nested object may be absent
/// depending on the event type.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: String,
    pub payment: Option<PaymentRef>,
    #[serde(rename = "pixAutomaticAuthorization")]
    pub pix_automatic_authorization: Option<AuthorizationRef>,
}

/// Payment object embedded in payment events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pix_automatic_authorization_id: String,
}

/// Authorization object embedded in authorization events.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationRef {
    #[serde(default)]
    pub id: String,
}

/// Event types this reconciler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AuthorizationActivated,
    AuthorizationRefused,
    AuthorizationCancelled,
    AuthorizationExpired,
    PaymentConfirmed,
    PaymentRefused,
    PaymentCancelled,
}

impl EventKind {
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            EVENT_AUTHORIZATION_ACTIVATED => Some(Self::AuthorizationActivated),
            EVENT_AUTHORIZATION_REFUSED => Some(Self::AuthorizationRefused),
            EVENT_AUTHORIZATION_CANCELLED => Some(Self::AuthorizationCancelled),
            EVENT_AUTHORIZATION_EXPIRED => Some(Self::AuthorizationExpired),
            EVENT_PAYMENT_CONFIRMED => Some(Self::PaymentConfirmed),
            EVENT_PAYMENT_REFUSED => Some(Self::PaymentRefused),
            EVENT_PAYMENT_CANCELLED => Some(Self::PaymentCancelled),
            _ => None,
        }
    }
}

/// A webhook delivery reduced to what reconciliation needs: the event kind
/// and the authorization id that links it to a business record.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: Option<EventKind>,
    pub authorization_id: String,
    pub charge_id: String,
    pub event: String,
}

impl Notification {
    /// Payment events carry the authorization id inside the payment object;
    /// authorization events carry it at the top level. Prefer the payment's
    /// reference whenever it is present.
    pub fn from_payload(payload: &WebhookPayload) -> Self {
        let mut authorization_id = String::new();
        let mut charge_id = String::new();

        if let Some(payment) = &payload.payment {
            charge_id = payment.id.clone();
            if !payment.pix_automatic_authorization_id.is_empty() {
                authorization_id = payment.pix_automatic_authorization_id.clone();
            }
        }
        if authorization_id.is_empty() {
            if let Some(authorization) = &payload.pix_automatic_authorization {
                authorization_id = authorization.id.clone();
            }
        }

        Self {
            kind: EventKind::parse(&payload.event),
            authorization_id,
            charge_id,
            event: payload.event.clone(),
        }
    }
}

/// What a delivery did to the local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A state transition was applied.
    Applied,
    /// The record was already past the required state.
    NoOp,
    /// No record matches the referenced authorization.
    UnknownReference,
    /// Event type we do not act on.
    UnhandledEvent,
}

/// Applies gateway events to subscription records.
pub struct WebhookReconciler {
    store: Arc<dyn SubscriptionStore>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Reconcile one delivery. Errors are only returned for store failures;
    /// every recognizable outcome, including stale and unknown deliveries,
    /// resolves to a [`Disposition`] so the caller can acknowledge receipt.
    pub async fn process(&self, notification: &Notification) -> BillingResult<Disposition> {
        let kind = match notification.kind {
            Some(kind) => kind,
            None => {
                tracing::debug!(event = %notification.event, "ignoring unhandled webhook event");
                return Ok(Disposition::UnhandledEvent);
            }
        };

        if notification.authorization_id.is_empty() {
            tracing::warn!(event = %notification.event, "webhook event without authorization reference");
            return Ok(Disposition::UnknownReference);
        }

        let business = match self
            .store
            .find_by_authorization(&notification.authorization_id)
            .await?
        {
            Some(business) => business,
            None => {
                tracing::debug!(
                    authorization_id = %notification.authorization_id,
                    event = %notification.event,
                    "webhook references no known subscription"
                );
                return Ok(Disposition::UnknownReference);
            }
        };

        let applied = match kind {
            EventKind::AuthorizationActivated => {
                let commitment = match business.plan() {
                    Some((_, commitment)) => commitment,
                    None => {
                        tracing::error!(
                            business_id = %business.id,
                            tier = %business.tier,
                            commitment = %business.commitment,
                            "cannot activate subscription with unknown plan"
                        );
                        return Ok(Disposition::NoOp);
                    }
                };
                let next = next_cycle_date(OffsetDateTime::now_utc().date(), commitment);
                self.store.activate(business.id, next).await?
            }
            EventKind::AuthorizationRefused | EventKind::AuthorizationCancelled => {
                self.store.mark_cancelled(business.id).await?;
                true
            }
            EventKind::AuthorizationExpired => {
                self.store.mark_payment_failed(business.id).await?;
                true
            }
            EventKind::PaymentConfirmed => {
                let commitment = match business.plan() {
                    Some((_, commitment)) => commitment,
                    None => {
                        tracing::error!(
                            business_id = %business.id,
                            tier = %business.tier,
                            commitment = %business.commitment,
                            "cannot settle payment for subscription with unknown plan"
                        );
                        return Ok(Disposition::NoOp);
                    }
                };
                let next = next_cycle_date(OffsetDateTime::now_utc().date(), commitment);
                self.store.confirm_payment(business.id, next).await?
            }
            EventKind::PaymentRefused | EventKind::PaymentCancelled => {
                self.store.refuse_payment(business.id).await?
            }
        };

        if applied {
            tracing::info!(
                business_id = %business.id,
                event = %notification.event,
                charge_id = %notification.charge_id,
                "webhook applied"
            );
            Ok(Disposition::Applied)
        } else {
            tracing::debug!(
                business_id = %business.id,
                event = %notification.event,
                "webhook was stale, record already transitioned"
            );
            Ok(Disposition::NoOp)
        }
    }
}

//! Periodic charge creation for active subscriptions.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::error::BillingResult;
use crate::gateway::{iso_date, ChargeRequest, PaymentGateway, BILLING_TYPE_PIX};
use crate::pricing;
use crate::store::SubscriptionStore;

/// Charges are created this many days ahead of `next_charge_date`; Pix
/// Automático notifies the payer before the debit, so the charge must exist
/// early.
pub const CHARGE_LOOKAHEAD_DAYS: i64 = 7;

/// Counters for one scheduler tick.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct ChargeRunSummary {
    pub due: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Scans for due subscriptions and creates one gateway charge per billing
/// period.
pub struct ChargeScheduler {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ChargeScheduler {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// One tick. Safe to re-run for the same period: the `charge_pending`
    /// claim makes already-charged records no-ops until a webhook settles
    /// the outcome.
    pub async fn run_once(&self) -> BillingResult<ChargeRunSummary> {
        let cutoff = (OffsetDateTime::now_utc() + Duration::days(CHARGE_LOOKAHEAD_DAYS)).date();
        let due = self.store.due_for_charge(cutoff).await?;
        let mut summary = ChargeRunSummary {
            due: due.len(),
            ..Default::default()
        };

        for business in due {
            let Some((tier, commitment)) = business.plan() else {
                tracing::error!(
                    business_id = %business.id,
                    tier = %business.tier,
                    commitment = %business.commitment,
                    "skipping charge: invalid tier/commitment"
                );
                summary.skipped += 1;
                continue;
            };
            let Some(next_charge_date) = business.next_charge_date else {
                summary.skipped += 1;
                continue;
            };

            let price = pricing::price_for(tier, commitment);
            let due_date = iso_date(next_charge_date);

            // Set charge_pending BEFORE calling the gateway. A crash after a
            // successful gateway call but before this write would make the
            // next tick charge the period again; this order instead risks a
            // stuck charge_pending=true with no charge behind it, which no
            // webhook will clear. The consistency checks surface those, and a
            // stuck flag is far less harmful than a double charge. The set is
            // a compare-and-set so concurrent ticks cannot both claim a record.
            let claimed = match self
                .store
                .begin_charge(business.id, OffsetDateTime::now_utc())
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!(business_id = %business.id, error = %e, "charge claim failed");
                    summary.failed += 1;
                    continue;
                }
            };
            if !claimed {
                summary.skipped += 1;
                continue;
            }

            // Due date rides in the reference so each billing period carries
            // a unique id at the gateway; duplicates for one period are
            // rejected there as well.
            let request = ChargeRequest {
                customer: business.customer_id.clone(),
                billing_type: BILLING_TYPE_PIX.to_string(),
                value: price,
                due_date: due_date.clone(),
                description: format!("Pauta - {tier}"),
                external_reference: format!("{}_{}", business.id, due_date),
                pix_automatic_authorization_id: business.authorization_id.clone(),
            };

            match self.gateway.create_charge(request).await {
                Ok(payment) => {
                    tracing::info!(
                        business_id = %business.id,
                        payment_id = %payment.id,
                        due_date = %due_date,
                        value = price,
                        "charge created"
                    );
                    summary.created += 1;
                }
                Err(e) => {
                    tracing::error!(business_id = %business.id, error = %e, "asaas create charge failed");
                    // Roll the claim back so the next tick retries.
                    if let Err(rollback) = self.store.clear_charge_pending(business.id).await {
                        tracing::error!(
                            business_id = %business.id,
                            error = %rollback,
                            "charge_pending rollback failed"
                        );
                    }
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

//! Subscription record store
//!
//! One row in `businesses` carries all billing state for a client. Every
//! guarded transition is a single conditional `UPDATE`, so two concurrent
//! callers can never both apply the same transition; the loser sees the
//! row count come back zero and backs off.

use async_trait::async_trait;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use pauta_shared::{Commitment, InviteStatus, Tier};

use crate::error::BillingResult;

/// One client business; the unit of consistency for all billing flows.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub client_name: String,
    pub client_email: String,
    pub phone: String,
    pub tier: String,
    pub commitment: String,
    pub invite_token: Option<String>,
    pub invite_status: String,
    pub invite_sent_at: Option<OffsetDateTime>,
    pub customer_id: String,
    pub authorization_id: String,
    pub qr_payload: String,
    pub charge_pending: bool,
    pub charge_requested_at: Option<OffsetDateTime>,
    pub next_charge_date: Option<Date>,
    pub terms_accepted_at: Option<OffsetDateTime>,
    pub terms_accepted_text: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Business {
    /// Current lifecycle state; unknown text reads as `draft`.
    pub fn status(&self) -> InviteStatus {
        InviteStatus::parse(&self.invite_status).unwrap_or(InviteStatus::Draft)
    }

    /// Stored plan selection resolved against the pricing enums, or `None`
    /// when either column holds text the table does not know.
    pub fn plan(&self) -> Option<(Tier, Commitment)> {
        Some((
            Tier::parse(&self.tier)?,
            Commitment::parse(&self.commitment)?,
        ))
    }
}

/// Port over the record store.
///
/// The `claim_*` and transition methods returning `bool` are compare-and-set:
/// `true` means this caller applied the transition, `false` means the record
/// was no longer in the required state.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> BillingResult<Option<Business>>;

    async fn find_by_token(&self, token: &str) -> BillingResult<Option<Business>>;

    async fn find_by_authorization(&self, authorization_id: &str)
        -> BillingResult<Option<Business>>;

    /// Stamp a freshly generated invite token and move the record to `invited`.
    async fn mark_invited(
        &self,
        id: Uuid,
        token: &str,
        sent_at: OffsetDateTime,
    ) -> BillingResult<()>;

    /// Claim an `invited` record for acceptance, persisting the accepted
    /// terms in the same write. `false` when the record is no longer
    /// `invited`.
    async fn claim_invite(
        &self,
        token: &str,
        accepted_at: OffsetDateTime,
        terms_text: &str,
    ) -> BillingResult<bool>;

    /// Roll a failed acceptance back to `invited`; only applies while the
    /// record is still `accepted`.
    async fn revert_to_invited(&self, id: Uuid) -> BillingResult<()>;

    /// Persist the gateway customer id on its own, before the authorization
    /// exists, so a later retry reuses the customer.
    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> BillingResult<()>;

    /// Persist the authorization outcome of a successful acceptance.
    async fn store_authorization(
        &self,
        id: Uuid,
        customer_id: &str,
        authorization_id: &str,
        qr_payload: &str,
    ) -> BillingResult<()>;

    async fn mark_cancelled(&self, id: Uuid) -> BillingResult<()>;

    async fn mark_payment_failed(&self, id: Uuid) -> BillingResult<()>;

    /// Records that are `active`, not pending, and due on or before `cutoff`.
    async fn due_for_charge(&self, cutoff: Date) -> BillingResult<Vec<Business>>;

    /// Claim a record for charging: sets `charge_pending` only while the
    /// record is `active` with no charge in flight.
    async fn begin_charge(&self, id: Uuid, requested_at: OffsetDateTime) -> BillingResult<bool>;

    /// Roll back a charge claim after a gateway failure.
    async fn clear_charge_pending(&self, id: Uuid) -> BillingResult<()>;

    /// Move the record to `active` unless it already is.
    async fn activate(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool>;

    /// Settle an in-flight charge: clear the pending flag and advance the
    /// next charge date, only while `active` with a charge pending.
    async fn confirm_payment(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool>;

    /// Fail an in-flight charge: clear the pending flag and move the record
    /// to `payment_failed`, only while a charge is pending.
    async fn refuse_payment(&self, id: Uuid) -> BillingResult<bool>;
}

/// Postgres-backed store.
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn find_by_id(&self, id: Uuid) -> BillingResult<Option<Business>> {
        let business = sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(business)
    }

    async fn find_by_token(&self, token: &str) -> BillingResult<Option<Business>> {
        let business =
            sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE invite_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(business)
    }

    async fn find_by_authorization(
        &self,
        authorization_id: &str,
    ) -> BillingResult<Option<Business>> {
        let business =
            sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE authorization_id = $1")
                .bind(authorization_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(business)
    }

    async fn mark_invited(
        &self,
        id: Uuid,
        token: &str,
        sent_at: OffsetDateTime,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET invite_token = $2, invite_status = 'invited', invite_sent_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_invite(
        &self,
        token: &str,
        accepted_at: OffsetDateTime,
        terms_text: &str,
    ) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET invite_status = 'accepted', terms_accepted_at = $2,
                terms_accepted_text = $3, updated_at = NOW()
            WHERE invite_token = $1 AND invite_status = 'invited'
            "#,
        )
        .bind(token)
        .bind(accepted_at)
        .bind(terms_text)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revert_to_invited(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET invite_status = 'invited', updated_at = NOW()
            WHERE id = $1 AND invite_status = 'accepted'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> BillingResult<()> {
        sqlx::query("UPDATE businesses SET customer_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn store_authorization(
        &self,
        id: Uuid,
        customer_id: &str,
        authorization_id: &str,
        qr_payload: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET customer_id = $2, authorization_id = $3, qr_payload = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(customer_id)
        .bind(authorization_id)
        .bind(qr_payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE businesses SET invite_status = 'cancelled', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_payment_failed(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET invite_status = 'payment_failed', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn due_for_charge(&self, cutoff: Date) -> BillingResult<Vec<Business>> {
        let due = sqlx::query_as::<_, Business>(
            r#"
            SELECT * FROM businesses
            WHERE invite_status = 'active'
              AND charge_pending = FALSE
              AND next_charge_date IS NOT NULL
              AND next_charge_date <= $1
            ORDER BY next_charge_date
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(due)
    }

    async fn begin_charge(&self, id: Uuid, requested_at: OffsetDateTime) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET charge_pending = TRUE, charge_requested_at = $2, updated_at = NOW()
            WHERE id = $1 AND invite_status = 'active' AND charge_pending = FALSE
            "#,
        )
        .bind(id)
        .bind(requested_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_charge_pending(&self, id: Uuid) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET charge_pending = FALSE, charge_requested_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activate(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET invite_status = 'active', next_charge_date = $2, updated_at = NOW()
            WHERE id = $1 AND invite_status <> 'active'
            "#,
        )
        .bind(id)
        .bind(next_charge_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn confirm_payment(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET charge_pending = FALSE, charge_requested_at = NULL,
                next_charge_date = $2, updated_at = NOW()
            WHERE id = $1 AND invite_status = 'active' AND charge_pending = TRUE
            "#,
        )
        .bind(id)
        .bind(next_charge_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refuse_payment(&self, id: Uuid) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET charge_pending = FALSE, charge_requested_at = NULL,
                invite_status = 'payment_failed', updated_at = NOW()
            WHERE id = $1 AND charge_pending = TRUE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

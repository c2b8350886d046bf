//! In-memory doubles for the billing ports.
//!
//! The store double keeps the same compare-and-set semantics as the Postgres
//! implementation so concurrency tests exercise the real claim logic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use pauta_shared::InviteStatus;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{
    Authorization, AuthorizationRequest, ChargeRequest, Customer, GatewayError, Payment,
    PaymentGateway,
};
use crate::invites::MessagingRelay;
use crate::store::{Business, SubscriptionStore};

/// A parceiro/mensal business in the `invited` state, invite sent an hour ago.
pub fn business_fixture() -> Business {
    let now = OffsetDateTime::now_utc();
    Business {
        id: Uuid::new_v4(),
        name: "Estúdio Mariana".to_string(),
        client_name: "Mariana Costa".to_string(),
        client_email: "mariana@example.com".to_string(),
        phone: "+5511999990000".to_string(),
        tier: "parceiro".to_string(),
        commitment: "mensal".to_string(),
        invite_token: Some("tok-fixture".to_string()),
        invite_status: "invited".to_string(),
        invite_sent_at: Some(now - time::Duration::hours(1)),
        customer_id: String::new(),
        authorization_id: String::new(),
        qr_payload: String::new(),
        charge_pending: false,
        charge_requested_at: None,
        next_charge_date: None,
        terms_accepted_at: None,
        terms_accepted_text: String::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Mutex-guarded map store mirroring the conditional-update semantics of
/// [`crate::store::PgSubscriptionStore`].
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    records: Mutex<HashMap<Uuid, Business>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Business>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().map(|b| (b.id, b)).collect()),
        }
    }

    pub fn insert(&self, business: Business) {
        self.lock().insert(business.id, business);
    }

    /// Snapshot of a record for assertions.
    pub fn get(&self, id: Uuid) -> Option<Business> {
        self.lock().get(&id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Business>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_by_id(&self, id: Uuid) -> BillingResult<Option<Business>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> BillingResult<Option<Business>> {
        Ok(self
            .lock()
            .values()
            .find(|b| b.invite_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_authorization(
        &self,
        authorization_id: &str,
    ) -> BillingResult<Option<Business>> {
        Ok(self
            .lock()
            .values()
            .find(|b| b.authorization_id == authorization_id)
            .cloned())
    }

    async fn mark_invited(
        &self,
        id: Uuid,
        token: &str,
        sent_at: OffsetDateTime,
    ) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.invite_token = Some(token.to_string());
            record.invite_status = InviteStatus::Invited.as_str().to_string();
            record.invite_sent_at = Some(sent_at);
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn claim_invite(
        &self,
        token: &str,
        accepted_at: OffsetDateTime,
        terms_text: &str,
    ) -> BillingResult<bool> {
        let mut records = self.lock();
        let Some(record) = records
            .values_mut()
            .find(|b| b.invite_token.as_deref() == Some(token))
        else {
            return Ok(false);
        };
        if record.status() != InviteStatus::Invited {
            return Ok(false);
        }
        record.invite_status = InviteStatus::Accepted.as_str().to_string();
        record.terms_accepted_at = Some(accepted_at);
        record.terms_accepted_text = terms_text.to_string();
        record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn revert_to_invited(&self, id: Uuid) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            if record.status() == InviteStatus::Accepted {
                record.invite_status = InviteStatus::Invited.as_str().to_string();
                record.updated_at = OffsetDateTime::now_utc();
            }
        }
        Ok(())
    }

    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.customer_id = customer_id.to_string();
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn store_authorization(
        &self,
        id: Uuid,
        customer_id: &str,
        authorization_id: &str,
        qr_payload: &str,
    ) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.customer_id = customer_id.to_string();
            record.authorization_id = authorization_id.to_string();
            record.qr_payload = qr_payload.to_string();
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.invite_status = InviteStatus::Cancelled.as_str().to_string();
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn mark_payment_failed(&self, id: Uuid) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.invite_status = InviteStatus::PaymentFailed.as_str().to_string();
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn due_for_charge(&self, cutoff: Date) -> BillingResult<Vec<Business>> {
        let mut due: Vec<Business> = self
            .lock()
            .values()
            .filter(|b| {
                b.status() == InviteStatus::Active
                    && !b.charge_pending
                    && b.next_charge_date.is_some_and(|d| d <= cutoff)
            })
            .cloned()
            .collect();
        due.sort_by_key(|b| b.next_charge_date);
        Ok(due)
    }

    async fn begin_charge(&self, id: Uuid, requested_at: OffsetDateTime) -> BillingResult<bool> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.status() != InviteStatus::Active || record.charge_pending {
            return Ok(false);
        }
        record.charge_pending = true;
        record.charge_requested_at = Some(requested_at);
        record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn clear_charge_pending(&self, id: Uuid) -> BillingResult<()> {
        if let Some(record) = self.lock().get_mut(&id) {
            record.charge_pending = false;
            record.charge_requested_at = None;
            record.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn activate(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.status() == InviteStatus::Active {
            return Ok(false);
        }
        record.invite_status = InviteStatus::Active.as_str().to_string();
        record.next_charge_date = Some(next_charge_date);
        record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn confirm_payment(&self, id: Uuid, next_charge_date: Date) -> BillingResult<bool> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if record.status() != InviteStatus::Active || !record.charge_pending {
            return Ok(false);
        }
        record.charge_pending = false;
        record.charge_requested_at = None;
        record.next_charge_date = Some(next_charge_date);
        record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn refuse_payment(&self, id: Uuid) -> BillingResult<bool> {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&id) else {
            return Ok(false);
        };
        if !record.charge_pending {
            return Ok(false);
        }
        record.charge_pending = false;
        record.charge_requested_at = None;
        record.invite_status = InviteStatus::PaymentFailed.as_str().to_string();
        record.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }
}

/// Scripted gateway double: records every request, can fail on demand, and
/// can hold each call open so tests can force a specific interleaving.
#[derive(Default)]
pub struct MockGateway {
    pub customers_created: Mutex<Vec<(String, String, String)>>,
    pub authorizations: Mutex<Vec<AuthorizationRequest>>,
    pub cancellations: Mutex<Vec<String>>,
    pub charges: Mutex<Vec<ChargeRequest>>,
    fail_create_customer: AtomicBool,
    fail_create_authorization: AtomicBool,
    fail_create_charge: AtomicBool,
    latency: Mutex<Option<Duration>>,
    sequence: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_customer_creation(&self) {
        self.fail_create_customer.store(true, Ordering::SeqCst);
    }

    pub fn fail_authorization_creation(&self) {
        self.fail_create_authorization.store(true, Ordering::SeqCst);
    }

    pub fn fail_charge_creation(&self) {
        self.fail_create_charge.store(true, Ordering::SeqCst);
    }

    /// Every gateway call sleeps this long before answering, giving
    /// concurrent callers a window to observe in-flight state.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = Some(latency);
    }

    pub fn customer_count(&self) -> usize {
        self.customers_created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn authorization_count(&self) -> usize {
        self.authorizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn charge_count(&self) -> usize {
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn pause(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn refusal() -> GatewayError {
        GatewayError::Api {
            status: 400,
            message: "refused by mock".to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(
        &self,
        name: &str,
        email: &str,
        tax_id: &str,
    ) -> Result<Customer, GatewayError> {
        self.pause().await;
        if self.fail_create_customer.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }
        self.customers_created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), email.to_string(), tax_id.to_string()));
        Ok(Customer {
            id: self.next_id("cus"),
        })
    }

    async fn create_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Authorization, GatewayError> {
        self.pause().await;
        if self.fail_create_authorization.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }
        let id = self.next_id("auth");
        let payload = format!("pix-copia-e-cola-{id}");
        self.authorizations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(Authorization {
            id,
            status: "PENDING".to_string(),
            payload,
        })
    }

    async fn cancel_authorization(&self, authorization_id: &str) -> Result<(), GatewayError> {
        self.pause().await;
        self.cancellations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(authorization_id.to_string());
        Ok(())
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<Payment, GatewayError> {
        self.pause().await;
        if self.fail_create_charge.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }
        self.charges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(Payment {
            id: self.next_id("pay"),
            status: "PENDING".to_string(),
        })
    }
}

/// Relay double that records messages instead of delivering them.
#[derive(Default)]
pub struct RecordingRelay {
    pub messages: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_delivery(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MessagingRelay for RecordingRelay {
    async fn send_text(&self, phone: &str, text: &str) -> BillingResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Delivery("relay down".to_string()));
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((phone.to_string(), text.to_string()));
        Ok(())
    }
}

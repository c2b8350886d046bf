// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing System
//!
//! Tests critical boundary conditions and race conditions in:
//! - Invite acceptance (concurrent claims, replays, rollback)
//! - Charge scheduling (duplicate ticks, gateway failures, due window)
//! - Webhook reconciliation (redelivery, out-of-order events)
//! - Full subscription lifecycle

#[cfg(test)]
mod accept_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Barrier;

    use crate::error::{BillingError, GatewayOp};
    use crate::invites::InviteService;
    use crate::mocks::{business_fixture, InMemorySubscriptionStore, MockGateway, RecordingRelay};
    use pauta_shared::InviteStatus;

    fn service(
        store: &Arc<InMemorySubscriptionStore>,
        gateway: &Arc<MockGateway>,
    ) -> InviteService {
        InviteService::new(
            store.clone(),
            gateway.clone(),
            Arc::new(RecordingRelay::new()),
            "http://test".to_string(),
        )
    }

    // =========================================================================
    // Many concurrent accepts of one invite - exactly one gateway sequence
    // runs; everyone else replays the stored payload or gets a conflict.
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_accepts_create_one_authorization() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        // Hold the winner inside the gateway so the others observe the claim.
        gateway.set_latency(Duration::from_millis(100));

        let business = business_fixture();
        let business_id = business.id;
        store.insert(business);

        let service = Arc::new(service(&store, &gateway));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];

        for _ in 0..8 {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                service.accept("tok-fixture", "12345678900").await
            }));
        }

        let mut accepted = 0;
        let mut conflicts = 0;
        let mut payloads = vec![];
        for handle in handles {
            match handle.await.unwrap() {
                Ok(result) => {
                    accepted += 1;
                    payloads.push(result.qr_payload);
                }
                Err(BillingError::ClaimConflict) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(accepted >= 1, "the claim winner must succeed");
        assert_eq!(accepted + conflicts, 8);
        assert_eq!(gateway.customer_count(), 1, "one customer created");
        assert_eq!(gateway.authorization_count(), 1, "one authorization created");
        // Every successful response carries the same payload.
        payloads.dedup();
        assert_eq!(payloads.len(), 1);

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Accepted);
        assert!(!record.authorization_id.is_empty());
        assert_eq!(Some(record.qr_payload), payloads.pop());
    }

    // =========================================================================
    // Accept after a finished acceptance - replay, no second gateway call
    // =========================================================================
    #[tokio::test]
    async fn test_accept_replays_after_completion() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        store.insert(business_fixture());
        let service = service(&store, &gateway);

        let first = service.accept("tok-fixture", "12345678900").await.unwrap();
        let second = service.accept("tok-fixture", "12345678900").await.unwrap();

        assert_eq!(first.qr_payload, second.qr_payload);
        assert_eq!(gateway.customer_count(), 1);
        assert_eq!(gateway.authorization_count(), 1);
    }

    // =========================================================================
    // Customer creation fails - record rolls back to invited, nothing kept
    // =========================================================================
    #[tokio::test]
    async fn test_customer_failure_rolls_back_to_invited() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_customer_creation();

        let business = business_fixture();
        let business_id = business.id;
        store.insert(business);
        let service = service(&store, &gateway);

        let err = service
            .accept("tok-fixture", "12345678900")
            .await
            .unwrap_err();
        match err {
            BillingError::Gateway { op, .. } => assert_eq!(op, GatewayOp::CreateCustomer),
            other => panic!("unexpected error: {other}"),
        }

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Invited, "claim rolled back");
        assert!(record.customer_id.is_empty());
        assert!(record.authorization_id.is_empty());
    }

    // =========================================================================
    // Authorization creation fails - rollback keeps the created customer so
    // a retry does not provision a duplicate
    // =========================================================================
    #[tokio::test]
    async fn test_authorization_failure_keeps_customer() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_authorization_creation();

        let business = business_fixture();
        let business_id = business.id;
        store.insert(business);
        let service = service(&store, &gateway);

        let err = service
            .accept("tok-fixture", "12345678900")
            .await
            .unwrap_err();
        match err {
            BillingError::Gateway { op, .. } => assert_eq!(op, GatewayOp::CreateAuthorization),
            other => panic!("unexpected error: {other}"),
        }

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Invited);
        assert!(
            !record.customer_id.is_empty(),
            "customer survives the rollback"
        );
        assert!(record.authorization_id.is_empty());
    }

    // =========================================================================
    // Retry with a customer from a previous attempt - reused, not recreated
    // =========================================================================
    #[tokio::test]
    async fn test_accept_reuses_existing_customer() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let mut business = business_fixture();
        business.customer_id = "cus_existing".to_string();
        store.insert(business);
        let service = service(&store, &gateway);

        service.accept("tok-fixture", "12345678900").await.unwrap();

        assert_eq!(gateway.customer_count(), 0, "no new customer");
        let requests = gateway.authorizations.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].customer_id, "cus_existing");
    }

    // =========================================================================
    // Expired invite - rejected before any claim or gateway call
    // =========================================================================
    #[tokio::test]
    async fn test_expired_invite_rejected_without_claim() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let mut business = business_fixture();
        business.invite_sent_at =
            Some(time::OffsetDateTime::now_utc() - time::Duration::days(8));
        let business_id = business.id;
        store.insert(business);
        let service = service(&store, &gateway);

        let err = service
            .accept("tok-fixture", "12345678900")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InviteExpired));

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Invited, "no state change");
        assert_eq!(gateway.customer_count(), 0);
    }

    // =========================================================================
    // Missing tax id - validation failure before any state change
    // =========================================================================
    #[tokio::test]
    async fn test_blank_tax_id_rejected() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        store.insert(business_fixture());
        let service = service(&store, &gateway);

        let err = service.accept("tok-fixture", "   ").await.unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
        assert_eq!(gateway.customer_count(), 0);
    }

    // =========================================================================
    // Accept against an active subscription / an unknown token
    // =========================================================================
    #[tokio::test]
    async fn test_accept_on_active_and_unknown_records() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let mut business = business_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        store.insert(business);
        let service = service(&store, &gateway);

        let err = service
            .accept("tok-fixture", "12345678900")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::AlreadyActive));

        let err = service.accept("tok-missing", "12345678900").await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound));
    }

    // =========================================================================
    // Relay failure during send - record stays out of the invited state
    // =========================================================================
    #[tokio::test]
    async fn test_relay_failure_leaves_record_untouched() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        let relay = Arc::new(RecordingRelay::new());
        relay.fail_delivery();

        let mut business = business_fixture();
        business.invite_status = InviteStatus::Draft.as_str().to_string();
        business.invite_token = None;
        business.invite_sent_at = None;
        let business_id = business.id;
        store.insert(business);

        let service = InviteService::new(
            store.clone(),
            gateway.clone(),
            relay.clone(),
            "http://test".to_string(),
        );

        let err = service.send(business_id).await.unwrap_err();
        assert!(matches!(err, BillingError::Delivery(_)));

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Draft);
        assert!(record.invite_token.is_none());
    }
}

#[cfg(test)]
mod charge_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::charges::ChargeScheduler;
    use crate::gateway::BILLING_TYPE_PIX;
    use crate::mocks::{business_fixture, InMemorySubscriptionStore, MockGateway};
    use crate::store::Business;
    use pauta_shared::InviteStatus;

    fn active_fixture(days_until_charge: i64) -> Business {
        let mut business = business_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        business.customer_id = "cus_1".to_string();
        business.authorization_id = "auth_1".to_string();
        business.qr_payload = "pix-copia-e-cola".to_string();
        business.next_charge_date = Some(
            (time::OffsetDateTime::now_utc() + time::Duration::days(days_until_charge)).date(),
        );
        business
    }

    // =========================================================================
    // Two scheduler ticks running at once - the pending claim lets only one
    // of them create the charge
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_ticks_charge_once() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        gateway.set_latency(Duration::from_millis(50));

        let business = active_fixture(3);
        let business_id = business.id;
        store.insert(business);

        let scheduler = Arc::new(ChargeScheduler::new(store.clone(), gateway.clone()));
        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_once().await })
        };
        let second = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_once().await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first.created + second.created, 1, "one charge across ticks");
        assert_eq!(gateway.charge_count(), 1);

        let record = store.get(business_id).unwrap();
        assert!(record.charge_pending, "awaiting the payment webhook");
        assert!(record.charge_requested_at.is_some());
    }

    // =========================================================================
    // Gateway refuses the charge - claim is rolled back for the next tick
    // =========================================================================
    #[tokio::test]
    async fn test_gateway_failure_rolls_back_claim() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        gateway.fail_charge_creation();

        let business = active_fixture(3);
        let business_id = business.id;
        store.insert(business);

        let scheduler = ChargeScheduler::new(store.clone(), gateway.clone());
        let summary = scheduler.run_once().await.unwrap();

        assert_eq!(summary.due, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 0);

        let record = store.get(business_id).unwrap();
        assert!(!record.charge_pending, "retryable on the next tick");
        assert!(record.charge_requested_at.is_none());
    }

    // =========================================================================
    // Due window - records beyond the lookahead or already pending are not
    // picked up
    // =========================================================================
    #[tokio::test]
    async fn test_due_window_and_pending_exclusions() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        store.insert(active_fixture(30));
        let mut pending = active_fixture(2);
        pending.charge_pending = true;
        store.insert(pending);

        let scheduler = ChargeScheduler::new(store.clone(), gateway.clone());
        let summary = scheduler.run_once().await.unwrap();

        assert_eq!(summary.due, 0);
        assert_eq!(gateway.charge_count(), 0);
    }

    // =========================================================================
    // Unknown plan text on an active record - skipped, not charged
    // =========================================================================
    #[tokio::test]
    async fn test_invalid_plan_skipped() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let mut business = active_fixture(2);
        business.tier = "premium".to_string();
        store.insert(business);

        let scheduler = ChargeScheduler::new(store.clone(), gateway.clone());
        let summary = scheduler.run_once().await.unwrap();

        assert_eq!(summary.due, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(gateway.charge_count(), 0);
    }

    // =========================================================================
    // Charge request contents - period-unique reference, Pix billing type,
    // plan price
    // =========================================================================
    #[tokio::test]
    async fn test_charge_request_contents() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let business = active_fixture(2);
        let business_id = business.id;
        let due = business.next_charge_date.unwrap();
        store.insert(business);

        let scheduler = ChargeScheduler::new(store.clone(), gateway.clone());
        scheduler.run_once().await.unwrap();

        let charges = gateway.charges.lock().unwrap();
        assert_eq!(charges.len(), 1);
        let request = &charges[0];
        let expected_due = format!("{:04}-{:02}-{:02}", due.year(), due.month() as u8, due.day());
        assert_eq!(request.customer, "cus_1");
        assert_eq!(request.billing_type, BILLING_TYPE_PIX);
        assert_eq!(request.value, 108.90);
        assert_eq!(request.due_date, expected_due);
        assert_eq!(request.description, "Pauta - parceiro");
        assert_eq!(
            request.external_reference,
            format!("{business_id}_{expected_due}")
        );
        assert_eq!(request.pix_automatic_authorization_id, "auth_1");
    }
}

#[cfg(test)]
mod webhook_flow_tests {
    use std::sync::Arc;

    use crate::mocks::{business_fixture, InMemorySubscriptionStore};
    use crate::pricing::next_cycle_date;
    use crate::store::Business;
    use crate::webhooks::{
        Disposition, EventKind, Notification, WebhookReconciler, EVENT_AUTHORIZATION_ACTIVATED,
        EVENT_AUTHORIZATION_EXPIRED, EVENT_AUTHORIZATION_REFUSED, EVENT_PAYMENT_CONFIRMED,
        EVENT_PAYMENT_REFUSED,
    };
    use pauta_shared::{Commitment, InviteStatus};

    fn accepted_fixture() -> Business {
        let mut business = business_fixture();
        business.invite_status = InviteStatus::Accepted.as_str().to_string();
        business.customer_id = "cus_1".to_string();
        business.authorization_id = "auth_1".to_string();
        business.qr_payload = "pix-copia-e-cola".to_string();
        business
    }

    fn notification(event: &str, authorization_id: &str) -> Notification {
        Notification {
            kind: EventKind::parse(event),
            authorization_id: authorization_id.to_string(),
            charge_id: String::new(),
            event: event.to_string(),
        }
    }

    // =========================================================================
    // Activation delivered twice - second delivery is a no-op and the next
    // charge date is not recomputed
    // =========================================================================
    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let business = accepted_fixture();
        let business_id = business.id;
        store.insert(business);

        let reconciler = WebhookReconciler::new(store.clone());
        let event = notification(EVENT_AUTHORIZATION_ACTIVATED, "auth_1");

        let first = reconciler.process(&event).await.unwrap();
        assert_eq!(first, Disposition::Applied);

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Active);
        let today = time::OffsetDateTime::now_utc().date();
        let expected_next = next_cycle_date(today, Commitment::Mensal);
        assert_eq!(record.next_charge_date, Some(expected_next));

        let second = reconciler.process(&event).await.unwrap();
        assert_eq!(second, Disposition::NoOp);
        let record = store.get(business_id).unwrap();
        assert_eq!(record.next_charge_date, Some(expected_next));
    }

    // =========================================================================
    // Payment confirmation requires an in-flight charge - confirmations with
    // no pending flag are stale redeliveries
    // =========================================================================
    #[tokio::test]
    async fn test_confirmation_requires_pending_charge() {
        use crate::store::SubscriptionStore;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let mut business = accepted_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        let business_id = business.id;
        store.insert(business);

        let reconciler = WebhookReconciler::new(store.clone());
        let event = notification(EVENT_PAYMENT_CONFIRMED, "auth_1");

        // No charge in flight yet: stale.
        assert_eq!(reconciler.process(&event).await.unwrap(), Disposition::NoOp);

        store
            .begin_charge(business_id, time::OffsetDateTime::now_utc())
            .await
            .unwrap();

        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        let record = store.get(business_id).unwrap();
        assert!(!record.charge_pending);
        let today = time::OffsetDateTime::now_utc().date();
        assert_eq!(
            record.next_charge_date,
            Some(next_cycle_date(today, Commitment::Mensal))
        );

        // Redelivery after settlement: stale again.
        assert_eq!(reconciler.process(&event).await.unwrap(), Disposition::NoOp);
    }

    // =========================================================================
    // Payment refusal - clears the in-flight charge and fails the record;
    // without a pending charge it is a no-op
    // =========================================================================
    #[tokio::test]
    async fn test_refusal_requires_pending_charge() {
        use crate::store::SubscriptionStore;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let mut business = accepted_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        let business_id = business.id;
        store.insert(business);

        let reconciler = WebhookReconciler::new(store.clone());
        let event = notification(EVENT_PAYMENT_REFUSED, "auth_1");

        assert_eq!(reconciler.process(&event).await.unwrap(), Disposition::NoOp);

        store
            .begin_charge(business_id, time::OffsetDateTime::now_utc())
            .await
            .unwrap();

        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::PaymentFailed);
        assert!(!record.charge_pending);
    }

    // =========================================================================
    // Authorization refused / expired - terminal transitions
    // =========================================================================
    #[tokio::test]
    async fn test_authorization_refusal_and_expiry() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let refused = accepted_fixture();
        let refused_id = refused.id;
        store.insert(refused);

        let mut expired = accepted_fixture();
        expired.invite_token = Some("tok-expired".to_string());
        expired.authorization_id = "auth_2".to_string();
        let expired_id = expired.id;
        store.insert(expired);

        let reconciler = WebhookReconciler::new(store.clone());

        let event = notification(EVENT_AUTHORIZATION_REFUSED, "auth_1");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        assert_eq!(
            store.get(refused_id).unwrap().status(),
            InviteStatus::Cancelled
        );

        let event = notification(EVENT_AUTHORIZATION_EXPIRED, "auth_2");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        assert_eq!(
            store.get(expired_id).unwrap().status(),
            InviteStatus::PaymentFailed
        );
    }

    // =========================================================================
    // Authorization cancellation mid-charge - the record leaves active but
    // the pending flag stays set; settlement never happened, so the record
    // must surface in the consistency sweep instead of looking clean
    // =========================================================================
    #[tokio::test]
    async fn test_authorization_cancelled_keeps_pending_charge_flagged() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mut business = accepted_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        business.charge_pending = true;
        business.charge_requested_at = Some(time::OffsetDateTime::now_utc());
        let business_id = business.id;
        store.insert(business);

        let reconciler = WebhookReconciler::new(store.clone());
        let event = notification(EVENT_AUTHORIZATION_REFUSED, "auth_1");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Cancelled);
        assert!(
            record.charge_pending,
            "in-flight charge is not settled by an authorization event"
        );
    }

    // =========================================================================
    // Unknown references and unhandled events - acknowledged without writes
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_and_unhandled_acknowledged() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        store.insert(accepted_fixture());
        let reconciler = WebhookReconciler::new(store.clone());

        let event = notification(EVENT_PAYMENT_CONFIRMED, "auth_missing");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::UnknownReference
        );

        let event = notification(EVENT_PAYMENT_CONFIRMED, "");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::UnknownReference
        );

        let event = notification("PAYMENT_CREATED", "auth_1");
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::UnhandledEvent
        );
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;

    use crate::charges::ChargeScheduler;
    use crate::invites::InviteService;
    use crate::mocks::{business_fixture, InMemorySubscriptionStore, MockGateway, RecordingRelay};
    use crate::pricing::next_cycle_date;
    use crate::webhooks::{
        Disposition, EventKind, Notification, WebhookReconciler, EVENT_AUTHORIZATION_ACTIVATED,
        EVENT_PAYMENT_CONFIRMED,
    };
    use pauta_shared::{Commitment, InviteStatus};

    fn notification(event: &str, authorization_id: &str) -> Notification {
        Notification {
            kind: EventKind::parse(event),
            authorization_id: authorization_id.to_string(),
            charge_id: String::new(),
            event: event.to_string(),
        }
    }

    // =========================================================================
    // Accept -> activate -> charge -> confirm, with a duplicate confirmation
    // at the end
    // =========================================================================
    #[tokio::test]
    async fn test_full_subscription_lifecycle() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let business = business_fixture();
        let business_id = business.id;
        store.insert(business);

        let invites = InviteService::new(
            store.clone(),
            gateway.clone(),
            Arc::new(RecordingRelay::new()),
            "http://test".to_string(),
        );
        let scheduler = ChargeScheduler::new(store.clone(), gateway.clone());
        let reconciler = WebhookReconciler::new(store.clone());

        // Client opens the invite link and accepts the terms.
        let accepted = invites.accept("tok-fixture", "12345678900").await.unwrap();
        assert!(!accepted.qr_payload.is_empty());

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Accepted);
        let authorization_id = record.authorization_id.clone();

        // Bank approves the recurring authorization.
        let event = notification(EVENT_AUTHORIZATION_ACTIVATED, &authorization_id);
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Active);
        assert!(record.next_charge_date.is_some());

        // Bring the charge date inside the lookahead window.
        let mut record = store.get(business_id).unwrap();
        record.next_charge_date =
            Some((time::OffsetDateTime::now_utc() + time::Duration::days(3)).date());
        store.insert(record);

        let summary = scheduler.run_once().await.unwrap();
        assert_eq!(summary.created, 1);
        assert!(store.get(business_id).unwrap().charge_pending);

        // Debit settles.
        let event = notification(EVENT_PAYMENT_CONFIRMED, &authorization_id);
        assert_eq!(
            reconciler.process(&event).await.unwrap(),
            Disposition::Applied
        );
        let record = store.get(business_id).unwrap();
        assert!(!record.charge_pending);
        let today = time::OffsetDateTime::now_utc().date();
        assert_eq!(
            record.next_charge_date,
            Some(next_cycle_date(today, Commitment::Mensal))
        );

        // Gateway redelivers the confirmation.
        assert_eq!(reconciler.process(&event).await.unwrap(), Disposition::NoOp);

        assert_eq!(gateway.customer_count(), 1);
        assert_eq!(gateway.authorization_count(), 1);
        assert_eq!(gateway.charge_count(), 1);
    }

    // =========================================================================
    // Cancel an active subscription - gateway authorization is cancelled,
    // record leaves the active state, second cancel is rejected
    // =========================================================================
    #[tokio::test]
    async fn test_cancel_flow() {
        use crate::error::BillingError;

        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());

        let mut business = business_fixture();
        business.invite_status = InviteStatus::Active.as_str().to_string();
        business.customer_id = "cus_1".to_string();
        business.authorization_id = "auth_1".to_string();
        let business_id = business.id;
        store.insert(business);

        let invites = InviteService::new(
            store.clone(),
            gateway.clone(),
            Arc::new(RecordingRelay::new()),
            "http://test".to_string(),
        );

        invites.cancel(business_id).await.unwrap();

        let cancellations = gateway.cancellations.lock().unwrap();
        assert_eq!(cancellations.as_slice(), ["auth_1"]);
        drop(cancellations);
        assert_eq!(
            store.get(business_id).unwrap().status(),
            InviteStatus::Cancelled
        );

        let err = invites.cancel(business_id).await.unwrap_err();
        assert!(matches!(err, BillingError::NoActiveSubscription));
    }

    // =========================================================================
    // Send then preview - fresh token lands in the delivered link and the
    // preview prices the stored plan
    // =========================================================================
    #[tokio::test]
    async fn test_send_then_preview() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let gateway = Arc::new(MockGateway::new());
        let relay = Arc::new(RecordingRelay::new());

        let mut business = business_fixture();
        business.invite_status = InviteStatus::Draft.as_str().to_string();
        business.invite_token = None;
        business.invite_sent_at = None;
        let business_id = business.id;
        store.insert(business);

        let invites = InviteService::new(
            store.clone(),
            gateway.clone(),
            relay.clone(),
            "http://test".to_string(),
        );

        let sent = invites.send(business_id).await.unwrap();
        assert_eq!(relay.message_count(), 1);

        let record = store.get(business_id).unwrap();
        assert_eq!(record.status(), InviteStatus::Invited);
        let token = record.invite_token.unwrap();
        assert!(sent.invite_url.ends_with(&token));

        let preview = invites.fetch(&token).await.unwrap();
        assert_eq!(preview.business_name, "Estúdio Mariana");
        assert_eq!(preview.tier, "parceiro");
        assert_eq!(preview.price, 108.90);
        assert_eq!(preview.commitment_months, 1);
        assert!(preview.qr_payload.is_none());
    }
}

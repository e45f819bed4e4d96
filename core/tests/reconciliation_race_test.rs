//! Payment reconciliation under concurrent and duplicate delivery.
//!
//! The processor webhook and the buyer's success page both try to issue the
//! tickets for one payment. Whatever the interleaving, exactly one set of
//! tickets may exist per payment reference.
//!
//! Run with: `cargo test --test reconciliation_race_test`

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic

use boxoffice_core::checkout::keys;
use boxoffice_core::payment_processor::SessionDetails;
use boxoffice_core::reconciliation::{
    CHECKOUT_COMPLETED, PAYMENT_SUCCEEDED, PaymentWebhookEvent, ReconcileOutcome,
};
use boxoffice_core::types::EventId;
use boxoffice_testing::{TestBoxOffice, fixtures};
use std::collections::HashSet;

fn webhook(event_type: &str, details: &SessionDetails) -> PaymentWebhookEvent {
    PaymentWebhookEvent {
        event_type: event_type.to_string(),
        metadata: details.metadata.clone(),
        payment_reference: details.payment_reference.clone(),
        amount: details.amount_total.map(|amount| amount.cents()),
        session_id: Some(details.session_id.clone()),
        account: Some(fixtures::PAYOUT_ACCOUNT.to_string()),
    }
}

async fn paid_session(harness: &TestBoxOffice, capacity: u32, quantity: u32) -> (EventId, SessionDetails) {
    let event_id = harness.create_event(capacity).await;
    harness
        .office
        .join_waitlist(event_id, fixtures::buyer(1))
        .await
        .unwrap();
    let session = harness.checkout(event_id, 1, quantity).await;
    let details = harness
        .processor
        .complete_session(&session.session_id)
        .await
        .unwrap();
    (event_id, details)
}

/// Test: webhook and success page race for the same payment.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_webhook_and_success_page_race() {
    boxoffice_testing::init_test_tracing();

    for _ in 0..20 {
        let harness = fixtures::box_office();
        let (event_id, details) = paid_session(&harness, 10, 2).await;

        let webhook_office = harness.office.clone();
        let event = webhook(CHECKOUT_COMPLETED, &details);
        let webhook_task =
            tokio::spawn(async move { webhook_office.handle_payment_event(event).await });

        let page_office = harness.office.clone();
        let session_id = details.session_id.clone();
        let page_task = tokio::spawn(async move {
            page_office
                .confirm_checkout_success(&fixtures::buyer(1), event_id, &session_id, Some(2))
                .await
        });

        let outcome = webhook_task.await.unwrap().unwrap().unwrap();
        let confirmation = page_task.await.unwrap().unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Issued { .. } | ReconcileOutcome::AlreadyProcessed { .. }
        ));
        assert_eq!(outcome.tickets().len(), 2);
        assert_eq!(confirmation.tickets.len(), 2);

        let held = harness
            .office
            .list_user_tickets(&fixtures::buyer(1))
            .await
            .unwrap();
        assert_eq!(held.len(), 2);

        let from_webhook: HashSet<_> = outcome.tickets().iter().map(|t| t.id).collect();
        let from_page: HashSet<_> = confirmation.tickets.iter().map(|t| t.id).collect();
        assert_eq!(from_webhook, from_page);
    }
}

/// Test: the processor redelivers both event types, repeatedly.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redelivered_events_issue_once() {
    let harness = fixtures::box_office();
    let (_, details) = paid_session(&harness, 10, 3).await;

    let mut handles = Vec::new();
    for attempt in 0..12 {
        let office = harness.office.clone();
        let kind = if attempt % 2 == 0 {
            CHECKOUT_COMPLETED
        } else {
            PAYMENT_SUCCEEDED
        };
        let event = webhook(kind, &details);
        handles.push(tokio::spawn(async move { office.handle_payment_event(event).await }));
    }

    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap().unwrap() {
            ReconcileOutcome::Issued { tickets } => {
                issued += 1;
                assert_eq!(tickets.len(), 3);
            }
            ReconcileOutcome::AlreadyProcessed { tickets } => assert_eq!(tickets.len(), 3),
            ReconcileOutcome::Unfulfilled { reason } => panic!("unexpected shortfall: {reason}"),
        }
    }

    assert_eq!(issued, 1);
    let held = harness
        .office
        .list_user_tickets(&fixtures::buyer(1))
        .await
        .unwrap();
    assert_eq!(held.len(), 3);
}

/// Test: a webhook without `buyer_id` is rejected and leaves no trace.
#[tokio::test]
async fn test_incomplete_metadata_is_not_retried() {
    let harness = fixtures::box_office();
    let (event_id, details) = paid_session(&harness, 10, 1).await;

    let mut event = webhook(CHECKOUT_COMPLETED, &details);
    event.metadata.remove(keys::BUYER_ID);
    let error = harness.office.handle_payment_event(event).await.unwrap_err();
    assert!(!error.is_retryable());

    let summary = harness
        .office
        .sales_summary(event_id, &fixtures::seller())
        .await
        .unwrap();
    assert_eq!(summary.sold, 0);
    assert_eq!(summary.unfulfilled_payments, 0);

    let retry = harness
        .office
        .handle_payment_event(webhook(CHECKOUT_COMPLETED, &details))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(retry, ReconcileOutcome::Issued { .. }));
}

/// Test: payment lands after the offer lapsed and the slot went to someone else.
#[tokio::test]
async fn test_payment_after_capacity_is_gone_is_recorded_unfulfilled() {
    let harness = fixtures::box_office();
    let (event_id, details) = paid_session(&harness, 1, 1).await;

    harness.clock.advance(chrono::Duration::minutes(31));
    harness
        .office
        .join_waitlist(event_id, fixtures::buyer(2))
        .await
        .unwrap();
    let session = harness.checkout(event_id, 2, 1).await;
    harness.pay_and_confirm(event_id, 2, &session, 1).await;

    let outcome = harness
        .office
        .handle_payment_event(webhook(CHECKOUT_COMPLETED, &details))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unfulfilled { .. }));

    let again = harness
        .office
        .handle_payment_event(webhook(PAYMENT_SUCCEEDED, &details))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, outcome);

    let summary = harness
        .office
        .sales_summary(event_id, &fixtures::seller())
        .await
        .unwrap();
    assert_eq!(summary.sold, 1);
    assert_eq!(summary.unfulfilled_payments, 1);
}

/// Test: a store outage surfaces as retryable so the processor redelivers.
#[tokio::test]
async fn test_store_outage_is_retryable() {
    let harness = fixtures::box_office();
    let (_, details) = paid_session(&harness, 10, 1).await;

    harness.store.fail_next_loads(1);
    let error = harness
        .office
        .handle_payment_event(webhook(CHECKOUT_COMPLETED, &details))
        .await
        .unwrap_err();
    assert!(error.is_retryable());

    let outcome = harness
        .office
        .handle_payment_event(webhook(CHECKOUT_COMPLETED, &details))
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Issued { .. }));
}

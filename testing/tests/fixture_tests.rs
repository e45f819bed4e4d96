//! Tests for the fixture box office itself.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use boxoffice_core::payment_processor::ProcessorError;
use boxoffice_core::types::EntryStatus;
use boxoffice_testing::fixtures;
use boxoffice_testing::processor::ProcessorCall;

#[tokio::test]
async fn test_fixture_purchase_flow() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(2).await;

    let position = harness
        .office
        .join_waitlist(event_id, fixtures::buyer(1))
        .await
        .unwrap();
    assert_eq!(position.status, EntryStatus::Offered);

    let session = harness.checkout(event_id, 1, 2).await;
    let tickets = harness.pay_and_confirm(event_id, 1, &session, 2).await;

    assert_eq!(tickets.len(), 2);
    assert_eq!(harness.processor.session_requests().len(), 1);
    assert!(matches!(
        harness.processor.calls().last(),
        Some(ProcessorCall::RetrieveSession { connected_account, .. }) if connected_account == fixtures::PAYOUT_ACCOUNT
    ));
}

#[tokio::test]
async fn test_injected_processor_failure_surfaces() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(1).await;
    harness
        .office
        .join_waitlist(event_id, fixtures::buyer(1))
        .await
        .unwrap();
    harness
        .processor
        .fail_next_create(ProcessorError::RequestFailed("connection reset".to_string()));

    let result = harness
        .office
        .create_checkout_session(boxoffice_core::checkout::CheckoutRequest {
            event_id,
            buyer_id: fixtures::buyer(1),
            quantity: 1,
            attendee_names: None,
            buyer: fixtures::profile(1),
        })
        .await;

    assert!(result.unwrap_err().is_retryable());
}

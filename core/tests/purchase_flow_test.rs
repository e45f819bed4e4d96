//! End-to-end purchase flow against in-memory collaborators.
//!
//! Run with: `cargo test --test purchase_flow_test`

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use boxoffice_core::checkout::{CheckoutError, CheckoutRequest, FEE_LINE_ITEM_NAME, keys};
use boxoffice_core::service::NEUTRAL_REDIRECT;
use boxoffice_core::types::{EntryStatus, Money, SellerId, TicketStatus};
use boxoffice_core::{BoxOfficeError, ErrorKind};
use boxoffice_testing::fixtures;
use chrono::Duration;

/// Test: two buyers, one seat each, through to the door.
#[tokio::test]
async fn test_full_purchase_scenario() {
    boxoffice_testing::init_test_tracing();
    let harness = fixtures::box_office();
    let event_id = harness.create_event(3).await;

    // Buyer 1 takes two of three seats.
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let session = harness.checkout(event_id, 1, 2).await;
    assert_eq!(session.breakdown.base_subtotal, Money::from_cents(20_000));
    assert_eq!(session.breakdown.platform_fee_total, Money::from_cents(200));

    let request = &harness.processor.session_requests()[0];
    assert_eq!(request.connected_account, fixtures::PAYOUT_ACCOUNT);
    assert_eq!(request.application_fee, Money::from_cents(200));
    assert_eq!(request.amount_total(), session.breakdown.total);
    assert!(request.line_items.iter().any(|item| item.name == FEE_LINE_ITEM_NAME));
    assert_eq!(request.metadata.get(keys::QUANTITY).map(String::as_str), Some("2"));
    assert!(request.success_url.contains("quantity=2"));

    let tickets = harness.pay_and_confirm(event_id, 1, &session, 2).await;
    assert_eq!(tickets.len(), 2);
    assert!(tickets.iter().all(|ticket| ticket.status == TicketStatus::Valid));
    let paid: u64 = tickets.iter().map(|ticket| ticket.amount_paid.cents()).sum();
    assert_eq!(paid, session.breakdown.total.cents());

    // Buyer 2 gets the last seat.
    let position = harness.office.join_waitlist(event_id, fixtures::buyer(2)).await.unwrap();
    assert_eq!(position.status, EntryStatus::Offered);
    let session = harness.checkout(event_id, 2, 1).await;
    harness.pay_and_confirm(event_id, 2, &session, 1).await;

    // Buyer 3 can only wait.
    let position = harness.office.join_waitlist(event_id, fixtures::buyer(3)).await.unwrap();
    assert_eq!(position.status, EntryStatus::Waiting);
    assert_eq!(harness.office.get_availability(event_id).await.unwrap().remaining_tickets, 0);

    let summary = harness
        .office
        .sales_summary(event_id, &fixtures::seller())
        .await
        .unwrap();
    assert_eq!(summary.sold, 3);
    assert_eq!(summary.waiting, 1);
    assert_eq!(summary.remaining, 0);

    let outcome = harness
        .office
        .check_in(event_id, tickets[0].id, fixtures::seller())
        .await
        .unwrap();
    assert_eq!(outcome.label(), "checked_in");
}

#[tokio::test]
async fn test_multi_ticket_checkout_requires_names() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(5).await;
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();

    let result = harness
        .office
        .create_checkout_session(CheckoutRequest {
            event_id,
            buyer_id: fixtures::buyer(1),
            quantity: 2,
            attendee_names: Some(vec!["Only One".to_string()]),
            buyer: fixtures::profile(1),
        })
        .await;

    assert!(matches!(
        result,
        Err(BoxOfficeError::Checkout(CheckoutError::MissingAttendeeNames { quantity: 2 }))
    ));
}

#[tokio::test]
async fn test_checkout_without_offer_is_refused() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(1).await;
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    harness.office.join_waitlist(event_id, fixtures::buyer(2)).await.unwrap();

    let result = harness
        .office
        .create_checkout_session(CheckoutRequest {
            event_id,
            buyer_id: fixtures::buyer(2),
            quantity: 1,
            attendee_names: None,
            buyer: fixtures::profile(2),
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_success_page_for_unknown_session_redirects() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(1).await;

    let confirmation = harness
        .office
        .confirm_checkout_success(&fixtures::buyer(1), event_id, "cs_missing", Some(1))
        .await
        .unwrap();

    assert!(confirmation.tickets.is_empty());
    assert_eq!(confirmation.redirect_to.as_deref(), Some(NEUTRAL_REDIRECT));
}

/// Test: a paid session that lost its seat never shows an earlier purchase.
#[tokio::test]
async fn test_unfulfilled_payment_redirects_instead_of_showing_old_tickets() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(2).await;

    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let first = harness.checkout(event_id, 1, 1).await;
    let earlier = harness.pay_and_confirm(event_id, 1, &first, 1).await;
    assert_eq!(earlier.len(), 1);

    // Buyer 1 comes back for the last seat and pays after the offer lapsed.
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let second = harness.checkout(event_id, 1, 1).await;
    harness.processor.complete_session(&second.session_id).await.unwrap();
    harness.clock.advance(Duration::minutes(31));
    let position = harness.office.join_waitlist(event_id, fixtures::buyer(2)).await.unwrap();
    assert_eq!(position.status, EntryStatus::Offered);

    let confirmation = harness
        .office
        .confirm_checkout_success(&fixtures::buyer(1), event_id, &second.session_id, Some(1))
        .await
        .unwrap();

    assert!(confirmation.tickets.is_empty());
    assert_eq!(confirmation.redirect_to.as_deref(), Some(NEUTRAL_REDIRECT));
    assert_eq!(harness.office.list_user_tickets(&fixtures::buyer(1)).await.unwrap(), earlier);
}

/// Test: the success page shows only the session's own tickets.
#[tokio::test]
async fn test_success_page_shows_only_this_purchase() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(5).await;

    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let first = harness.checkout(event_id, 1, 1).await;
    let earlier = harness.pay_and_confirm(event_id, 1, &first, 1).await;

    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let second = harness.checkout(event_id, 1, 2).await;
    let latest = harness.pay_and_confirm(event_id, 1, &second, 2).await;

    assert_eq!(latest.len(), 2);
    assert!(latest.iter().all(|ticket| ticket.id != earlier[0].id));
}

#[tokio::test]
async fn test_store_outage_during_checkout_is_retryable() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(1).await;
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();

    harness.store.fail_next_loads(1);
    let result = harness
        .office
        .create_checkout_session(CheckoutRequest {
            event_id,
            buyer_id: fixtures::buyer(1),
            quantity: 1,
            attendee_names: None,
            buyer: fixtures::profile(1),
        })
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Transient);
    assert!(harness.processor.session_requests().is_empty());
}

#[tokio::test]
async fn test_store_outage_on_join_leaves_no_entry() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(1).await;
    let appends = harness.store.append_count();

    harness.store.fail_next_appends(1);
    let error = harness
        .office
        .join_waitlist(event_id, fixtures::buyer(1))
        .await
        .unwrap_err();
    assert!(error.is_retryable());
    assert_eq!(harness.store.append_count(), appends);

    let position = harness
        .office
        .get_queue_position(event_id, &fixtures::buyer(1))
        .await
        .unwrap();
    assert_eq!(position, None);
}

#[tokio::test]
async fn test_cancel_is_seller_only_and_stops_sales() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(2).await;

    let forbidden = harness
        .office
        .cancel_event(event_id, SellerId::new("someone-else"))
        .await;
    assert!(matches!(forbidden, Err(BoxOfficeError::Forbidden(_))));

    let cancelled = harness
        .office
        .cancel_event(event_id, fixtures::seller())
        .await
        .unwrap();
    assert!(cancelled.is_cancelled);

    let join = harness.office.join_waitlist(event_id, fixtures::buyer(1)).await;
    assert!(matches!(join, Err(BoxOfficeError::Waitlist(_))));
}

#[tokio::test]
async fn test_tickets_are_private_to_their_buyer() {
    let harness = fixtures::box_office();
    let event_id = harness.create_event(2).await;
    harness.office.join_waitlist(event_id, fixtures::buyer(1)).await.unwrap();
    let session = harness.checkout(event_id, 1, 1).await;
    let tickets = harness.pay_and_confirm(event_id, 1, &session, 1).await;

    let stranger = harness
        .office
        .get_ticket(&fixtures::buyer(2), tickets[0].id)
        .await;
    assert!(matches!(stranger, Err(BoxOfficeError::TicketNotFound(_))));
    assert!(harness.office.list_user_tickets(&fixtures::buyer(2)).await.unwrap().is_empty());
}

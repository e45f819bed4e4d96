//! HTTP API tests against in-memory collaborators.
//!
//! Run with: `cargo test -p boxoffice-web --test http_api_test`

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use boxoffice_core::CheckInOutcome;
use boxoffice_core::ledger::QueuePosition;
use boxoffice_core::payment_processor::SessionDetails;
use boxoffice_core::reconciliation::{CHECKOUT_COMPLETED, PaymentWebhookEvent};
use boxoffice_core::service::{CheckoutConfirmation, CheckoutSession};
use boxoffice_core::types::{EntryStatus, Event, Ticket, TicketStatus};
use boxoffice_testing::{TestBoxOffice, fixtures};
use boxoffice_web::{AppState, CORRELATION_ID_HEADER, build_router};
use serde_json::{Value, json};

fn server(harness: &TestBoxOffice) -> TestServer {
    TestServer::new(build_router(AppState::new(harness.office.clone()))).unwrap()
}

fn user(id: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(id).unwrap(),
    )
}

fn webhook(details: &SessionDetails) -> PaymentWebhookEvent {
    PaymentWebhookEvent {
        event_type: CHECKOUT_COMPLETED.to_string(),
        metadata: details.metadata.clone(),
        payment_reference: details.payment_reference.clone(),
        amount: details.amount_total.map(|amount| amount.cents()),
        session_id: Some(details.session_id.clone()),
        account: Some(fixtures::PAYOUT_ACCOUNT.to_string()),
    }
}

async fn create_event(server: &TestServer, capacity: u32) -> Event {
    let (name, value) = user(fixtures::SELLER);
    let response = server
        .post("/api/events")
        .add_header(name, value)
        .json(&json!({
            "name": "Jazz Night",
            "event_date": "2025-01-08T20:00:00Z",
            "unit_price_cents": fixtures::UNIT_PRICE_CENTS,
            "total_capacity": capacity,
            "payout_account": fixtures::PAYOUT_ACCOUNT,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Event>()
}

async fn paid_session(
    harness: &TestBoxOffice,
    server: &TestServer,
    event: &Event,
) -> SessionDetails {
    let (name, value) = user("buyer-1");
    server
        .post(&format!("/api/events/{}/waitlist", event.id))
        .add_header(name, value)
        .await
        .assert_status_ok();

    let (name, value) = user("buyer-1");
    let response = server
        .post(&format!("/api/events/{}/checkout", event.id))
        .add_header(name, value)
        .json(&json!({
            "quantity": 1,
            "buyer": {"name": "Ada Lovelace", "email": "ada@example.com"},
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let session = response.json::<CheckoutSession>();

    harness
        .processor
        .complete_session(&session.session_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let harness = fixtures::box_office();
    let server = server(&harness);

    let health = server.get("/health").await;
    health.assert_status_ok();
    assert_eq!(health.json::<Value>()["status"], "ok");
    assert!(!health.header(CORRELATION_ID_HEADER).is_empty());

    let ready = server.get("/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["ready"], true);
}

#[tokio::test]
async fn test_api_requires_caller() {
    let harness = fixtures::box_office();
    let server = server(&harness);

    let response = server.get("/api/tickets").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");
}

/// Test: seller creates, buyer queues and pays, webhook issues, door admits.
#[tokio::test]
async fn test_purchase_through_http() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 2).await;
    assert_eq!(event.seller_id.as_str(), fixtures::SELLER);

    let (name, value) = user("buyer-2");
    let position = server
        .post(&format!("/api/events/{}/waitlist", event.id))
        .add_header(name, value)
        .await
        .json::<QueuePosition>();
    assert_eq!(position.status, EntryStatus::Offered);

    let details = paid_session(&harness, &server, &event).await;
    let response = server
        .post("/api/webhooks/payments")
        .json(&webhook(&details))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"]["outcome"], "issued");

    let (name, value) = user("buyer-1");
    let tickets = server
        .get("/api/tickets")
        .add_header(name, value)
        .await
        .json::<Vec<Ticket>>();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].status, TicketStatus::Valid);

    let (name, value) = user("buyer-1");
    let ticket = server
        .get(&format!("/api/tickets/{}", tickets[0].id))
        .add_header(name, value)
        .await
        .json::<Ticket>();
    assert_eq!(ticket.id, tickets[0].id);

    let (name, value) = user("buyer-2");
    server
        .get(&format!("/api/tickets/{}", tickets[0].id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    for expected in ["checked_in", "already_checked_in"] {
        let (name, value) = user(fixtures::SELLER);
        let outcome = server
            .post(&format!("/api/events/{}/check-in", event.id))
            .add_header(name, value)
            .json(&json!({ "ticket_id": tickets[0].id }))
            .await
            .json::<CheckInOutcome>();
        assert_eq!(outcome.label(), expected);
    }

    let (name, value) = user(fixtures::SELLER);
    let summary = server
        .get(&format!("/api/events/{}/summary", event.id))
        .add_header(name, value)
        .await
        .json::<Value>();
    assert_eq!(summary["sold"], 1);
    assert_eq!(summary["checked_in"], 1);
}

#[tokio::test]
async fn test_redelivered_webhook_is_acknowledged_once() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 3).await;
    let details = paid_session(&harness, &server, &event).await;

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        let response = server
            .post("/api/webhooks/payments")
            .json(&webhook(&details))
            .await;
        response.assert_status_ok();
        outcomes.push(response.json::<Value>()["outcome"]["outcome"].clone());
    }

    assert_eq!(outcomes, vec!["issued", "already_processed", "already_processed"]);
}

#[tokio::test]
async fn test_success_page_issues_when_webhook_is_late() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 3).await;
    let details = paid_session(&harness, &server, &event).await;

    let (name, value) = user("buyer-1");
    let confirmation = server
        .get("/api/checkout/success")
        .add_header(name, value)
        .add_query_param("session_id", &details.session_id)
        .add_query_param("event_id", event.id)
        .add_query_param("quantity", 1)
        .await
        .json::<CheckoutConfirmation>();

    assert_eq!(confirmation.tickets.len(), 1);
    assert_eq!(confirmation.redirect_to, None);
}

#[tokio::test]
async fn test_success_page_for_unknown_session_redirects() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 1).await;

    let (name, value) = user("buyer-1");
    let confirmation = server
        .get("/api/checkout/success")
        .add_header(name, value)
        .add_query_param("session_id", "cs_missing")
        .add_query_param("event_id", event.id)
        .await
        .json::<CheckoutConfirmation>();

    assert!(confirmation.tickets.is_empty());
    assert_eq!(confirmation.redirect_to.as_deref(), Some("/"));
}

#[tokio::test]
async fn test_malformed_webhook_is_rejected_for_good() {
    let harness = fixtures::box_office();
    let server = server(&harness);

    let response = server
        .post("/api/webhooks/payments")
        .json(&json!({
            "type": CHECKOUT_COMPLETED,
            "metadata": {},
            "payment_reference": "pi_orphan",
            "amount": 10_433,
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_during_store_outage_asks_for_redelivery() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 3).await;
    let details = paid_session(&harness, &server, &event).await;

    harness.store.fail_next_loads(1);
    let response = server
        .post("/api/webhooks/payments")
        .json(&webhook(&details))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let retry = server
        .post("/api/webhooks/payments")
        .json(&webhook(&details))
        .await;
    retry.assert_status_ok();
    assert_eq!(retry.json::<Value>()["outcome"]["outcome"], "issued");
}

#[tokio::test]
async fn test_unhandled_event_type_is_acknowledged() {
    let harness = fixtures::box_office();
    let server = server(&harness);

    let response = server
        .post("/api/webhooks/payments")
        .json(&json!({ "type": "customer.created" }))
        .await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["received"], true);
    assert!(body.get("outcome").is_none());
}

#[tokio::test]
async fn test_seller_routes_are_owner_only() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 2).await;

    let (name, value) = user("intruder");
    server
        .post(&format!("/api/events/{}/cancel", event.id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    for path in ["attendees", "summary"] {
        let (name, value) = user("intruder");
        server
            .get(&format!("/api/events/{}/{path}", event.id))
            .add_header(name, value)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    let (name, value) = user(fixtures::SELLER);
    let cancelled = server
        .post(&format!("/api/events/{}/cancel", event.id))
        .add_header(name, value)
        .await
        .json::<Event>();
    assert!(cancelled.is_cancelled);

    let availability = server
        .get(&format!("/api/events/{}/availability", event.id))
        .await
        .json::<Value>();
    assert_eq!(availability["is_cancelled"], true);
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let harness = fixtures::box_office();
    let server = server(&harness);

    let response = server
        .get(&format!("/api/events/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_waitlist_position_and_release() {
    let harness = fixtures::box_office();
    let server = server(&harness);
    let event = create_event(&server, 1).await;

    for buyer in ["buyer-1", "buyer-2"] {
        let (name, value) = user(buyer);
        server
            .post(&format!("/api/events/{}/waitlist", event.id))
            .add_header(name, value)
            .await
            .assert_status_ok();
    }

    let (name, value) = user("buyer-2");
    let waiting = server
        .get(&format!("/api/events/{}/waitlist/me", event.id))
        .add_header(name, value)
        .await
        .json::<QueuePosition>();
    assert_eq!(waiting.position, Some(1));

    let (name, value) = user("buyer-1");
    server
        .delete(&format!("/api/events/{}/waitlist/me/offer", event.id))
        .add_header(name, value)
        .await
        .assert_status_ok();

    let (name, value) = user("buyer-2");
    let promoted = server
        .get(&format!("/api/events/{}/waitlist/me", event.id))
        .add_header(name, value)
        .await
        .json::<QueuePosition>();
    assert_eq!(promoted.status, EntryStatus::Offered);

    let (name, value) = user("buyer-3");
    server
        .get(&format!("/api/events/{}/waitlist/me", event.id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

//! Router configuration.

use crate::handlers::{checkout, events, health_check, readiness_check, tickets, waitlist};
use crate::middleware::track_request;
use crate::state::AppState;
use axum::{
    Router,
    middleware::from_fn,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// API routes live under `/api` and identify the caller by the `X-User-Id`
/// header. `/health` and `/ready` are unauthenticated.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Events
        .route("/events", post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/cancel", post(events::cancel_event))
        .route("/events/:id/availability", get(events::get_availability))
        .route("/events/:id/attendees", get(events::list_attendees))
        .route("/events/:id/summary", get(events::sales_summary))
        // Waiting list
        .route("/events/:id/waitlist", post(waitlist::join_waitlist))
        .route("/events/:id/waitlist/me", get(waitlist::get_queue_position))
        .route(
            "/events/:id/waitlist/me/offer",
            delete(waitlist::release_offer),
        )
        // Checkout and payments
        .route("/events/:id/checkout", post(checkout::create_checkout))
        .route("/checkout/success", get(checkout::checkout_success))
        .route("/webhooks/payments", post(checkout::payment_webhook))
        // Tickets
        .route("/events/:id/check-in", post(tickets::check_in))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/:id", get(tickets::get_ticket));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(track_request))
        .with_state(state)
}

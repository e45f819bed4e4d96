//! Event management API endpoints.
//!
//! - POST /api/events - Create an event (caller becomes the seller)
//! - GET /api/events/:id - Event details
//! - POST /api/events/:id/cancel - Cancel an event (seller only)
//! - GET /api/events/:id/availability - Remaining capacity
//! - GET /api/events/:id/attendees - Admitted attendees (seller only)
//! - GET /api/events/:id/summary - Sales counters (seller only)

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_core::aggregates::NewEvent;
use boxoffice_core::ledger::{Attendee, SalesSummary};
use boxoffice_core::service::Availability;
use boxoffice_core::types::{Event, EventId, Money};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// Request to create an event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Display name
    pub name: String,
    /// When the event takes place
    pub event_date: DateTime<Utc>,
    /// Price of one admission in cents
    pub unit_price_cents: u64,
    /// Admissions for sale
    pub total_capacity: u32,
    /// Seller's connected processor account
    #[serde(default)]
    pub payout_account: Option<String>,
}

impl From<CreateEventRequest> for NewEvent {
    fn from(request: CreateEventRequest) -> Self {
        Self {
            name: request.name,
            event_date: request.event_date,
            unit_price: Money::from_cents(request.unit_price_cents),
            total_capacity: request.total_capacity,
            payout_account: request.payout_account,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "X-User-Id: seller_1" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Jazz Night",
///     "event_date": "2026-06-01T20:00:00Z",
///     "unit_price_cents": 2500,
///     "total_capacity": 120,
///     "payout_account": "acct_123"
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 if the event details are invalid.
pub async fn create_event(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state
        .office
        .create_event(caller.seller(), request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Get event details.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, AppError> {
    let event = state.office.get_event(EventId::from_uuid(event_id)).await?;
    Ok(Json(event))
}

/// Cancel an event. Sales stop and no ticket is admitted afterwards.
///
/// # Errors
///
/// Returns 403 if the caller is not the event's seller, 404 if the event
/// does not exist.
pub async fn cancel_event(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, AppError> {
    let event = state
        .office
        .cancel_event(EventId::from_uuid(event_id), caller.seller())
        .await?;
    Ok(Json(event))
}

/// Public availability, with lapsed offers already released.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn get_availability(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Availability>, AppError> {
    let availability = state
        .office
        .get_availability(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(availability))
}

/// Attendee list for the door.
///
/// # Errors
///
/// Returns 403 if the caller is not the event's seller.
pub async fn list_attendees(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<Attendee>>, AppError> {
    let attendees = state
        .office
        .list_attendees(EventId::from_uuid(event_id), &caller.seller())
        .await?;
    Ok(Json(attendees))
}

/// Seller dashboard counters.
///
/// # Errors
///
/// Returns 403 if the caller is not the event's seller.
pub async fn sales_summary(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<SalesSummary>, AppError> {
    let summary = state
        .office
        .sales_summary(EventId::from_uuid(event_id), &caller.seller())
        .await?;
    Ok(Json(summary))
}

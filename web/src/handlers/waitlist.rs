//! Waiting list API endpoints.
//!
//! - POST /api/events/:id/waitlist - Join (or re-read) the caller's entry
//! - GET /api/events/:id/waitlist/me - The caller's position
//! - DELETE /api/events/:id/waitlist/me/offer - Give up a held offer

use crate::error::AppError;
use crate::extractors::Caller;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use boxoffice_core::ledger::QueuePosition;
use boxoffice_core::types::EventId;
use uuid::Uuid;

/// Join an event's waiting list.
///
/// Joining twice returns the existing live entry. When capacity is free the
/// entry comes back already offered.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/waitlist \
///   -H "X-User-Id: buyer_7"
/// ```
///
/// # Errors
///
/// Returns 422 if the event is cancelled or sales have closed.
pub async fn join_waitlist(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<QueuePosition>, AppError> {
    let position = state
        .office
        .join_waitlist(EventId::from_uuid(event_id), caller.buyer())
        .await?;
    Ok(Json(position))
}

/// The caller's current place in the waiting list.
///
/// # Errors
///
/// Returns 404 if the caller never joined.
pub async fn get_queue_position(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<QueuePosition>, AppError> {
    state
        .office
        .get_queue_position(EventId::from_uuid(event_id), &caller.buyer())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("not on the waiting list"))
}

/// Release the caller's offer to the next buyer in line.
///
/// # Errors
///
/// Returns 422 if the caller holds no live offer.
pub async fn release_offer(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
) -> Result<Json<QueuePosition>, AppError> {
    let position = state
        .office
        .release_offer(EventId::from_uuid(event_id), caller.buyer())
        .await?;
    Ok(Json(position))
}

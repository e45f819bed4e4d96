//! Ticket API endpoints.
//!
//! - GET /api/tickets - The caller's tickets
//! - GET /api/tickets/:id - One of the caller's tickets
//! - POST /api/events/:id/check-in - Redeem a scanned ticket (seller only)

use crate::error::AppError;
use crate::extractors::{Caller, CorrelationId};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use boxoffice_core::CheckInOutcome;
use boxoffice_core::types::{EventId, Ticket, TicketId};
use serde::Deserialize;
use uuid::Uuid;

/// A scanned ticket code.
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    /// Ticket id encoded in the QR code
    pub ticket_id: Uuid,
}

/// List the caller's tickets across all events.
///
/// # Errors
///
/// Returns 503 if the ledger is unavailable.
pub async fn list_tickets(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = state.office.list_user_tickets(&caller.buyer()).await?;
    Ok(Json(tickets))
}

/// Get one ticket. Other buyers' tickets read as missing.
///
/// # Errors
///
/// Returns 404 if the ticket does not exist or belongs to someone else.
pub async fn get_ticket(
    State(state): State<AppState>,
    caller: Caller,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state
        .office
        .get_ticket(&caller.buyer(), TicketId::from_uuid(ticket_id))
        .await?;
    Ok(Json(ticket))
}

/// Redeem a ticket at the door.
///
/// Every scan answers 200 with an outcome; a ticket that cannot be admitted
/// is a normal result, not an error.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/check-in \
///   -H "X-User-Id: seller_1" \
///   -H "Content-Type: application/json" \
///   -d '{"ticket_id": "<ticket_id>"}'
/// ```
///
/// # Errors
///
/// Returns 503 if the ledger is unavailable, 409 if the event is too
/// contended to record the scan.
pub async fn check_in(
    State(state): State<AppState>,
    caller: Caller,
    correlation_id: CorrelationId,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CheckInOutcome>, AppError> {
    let outcome = state
        .office
        .check_in(
            EventId::from_uuid(event_id),
            TicketId::from_uuid(request.ticket_id),
            caller.seller(),
        )
        .await?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        ticket_id = %request.ticket_id,
        outcome = outcome.label(),
        "Ticket scanned"
    );
    Ok(Json(outcome))
}

//! Checkout and payment API endpoints.
//!
//! - POST /api/events/:id/checkout - Start a hosted checkout for an offer
//! - GET /api/checkout/success - Success page data; issues tickets if needed
//! - POST /api/webhooks/payments - Processor webhook (signature verified upstream)

use crate::error::AppError;
use crate::extractors::{Caller, CorrelationId};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use boxoffice_core::checkout::CheckoutRequest;
use boxoffice_core::reconciliation::{PaymentWebhookEvent, ReconcileOutcome};
use boxoffice_core::service::{CheckoutConfirmation, CheckoutSession};
use boxoffice_core::types::{BuyerProfile, EventId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to start a checkout.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Admissions wanted
    pub quantity: u32,
    /// One name per admission, required when buying more than one
    #[serde(default)]
    pub attendee_names: Option<Vec<String>>,
    /// Buyer contact details
    #[serde(default)]
    pub buyer: BuyerProfile,
}

/// Query string the processor appends to the success redirect.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    /// Processor session id
    pub session_id: String,
    /// Event the checkout was for
    pub event_id: Uuid,
    /// Quantity the buyer asked for
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true; failures answer with an error status instead
    pub received: bool,
    /// What reconciliation did, absent for ignored event types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileOutcome>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a checkout for the caller's live offer.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/checkout \
///   -H "X-User-Id: buyer_7" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "quantity": 2,
///     "attendee_names": ["Ada Lovelace", "Charles Babbage"],
///     "buyer": {"name": "Ada Lovelace", "email": "ada@example.com"}
///   }'
/// ```
///
/// # Errors
///
/// Returns 422 if the caller holds no live offer, asks for more than the
/// offer allows, or omits attendee names.
pub async fn create_checkout(
    State(state): State<AppState>,
    caller: Caller,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), AppError> {
    let session = state
        .office
        .create_checkout_session(CheckoutRequest {
            event_id: EventId::from_uuid(event_id),
            buyer_id: caller.buyer(),
            quantity: request.quantity,
            attendee_names: request.attendee_names,
            buyer: request.buyer,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Success page data.
///
/// Reconciles the session if the webhook has not arrived yet. When nothing
/// can be shown the body carries `redirect_to` instead of tickets.
///
/// # Errors
///
/// Returns 503 only when the ledger or processor is unavailable.
pub async fn checkout_success(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<CheckoutConfirmation>, AppError> {
    let confirmation = state
        .office
        .confirm_checkout_success(
            &caller.buyer(),
            EventId::from_uuid(query.event_id),
            &query.session_id,
            query.quantity,
        )
        .await?;
    Ok(Json(confirmation))
}

/// Processor webhook.
///
/// # Errors
///
/// Returns 400 for events that can never be reconciled (the processor stops
/// redelivering) and 500 for failures worth a redelivery.
pub async fn payment_webhook(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Json(event): Json<PaymentWebhookEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    let event_type = event.event_type.clone();
    let outcome = state
        .office
        .handle_payment_event(event)
        .await
        .map_err(AppError::from_webhook)?;

    tracing::info!(
        correlation_id = %correlation_id.0,
        event_type,
        outcome = outcome.as_ref().map_or("ignored", ReconcileOutcome::label),
        "Payment webhook handled"
    );
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

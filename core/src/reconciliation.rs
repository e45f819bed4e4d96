//! Payment reconciliation.
//!
//! Both the processor's webhook and the buyer's success page report completed
//! payments, often for the same charge and at nearly the same moment. Each
//! report is reduced into the event's ledger with [`IssuanceReducer`]; the
//! store's unique index on payment references makes the second report a
//! no-op whichever path wins.

use crate::aggregates::{IssuanceError, IssuanceReducer, IssueTickets};
use crate::checkout::{CheckoutMetadata, FEE_LINE_ITEM_NAME, MetadataError};
use crate::error::ErrorKind;
use crate::ledger::PaymentRecord;
use crate::payment_processor::{Metadata, PaymentProcessor, ProcessorError};
use crate::store::{DispatchError, LedgerRepository, StoreError};
use crate::types::{EventId, Money, PaymentReference};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

pub use crate::aggregates::ReconcileOutcome;

/// Webhook event type for a completed hosted checkout.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Webhook event type for a captured charge.
pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Path a payment completion arrived through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Webhook: hosted checkout completed
    CheckoutCompleted,
    /// Webhook: charge succeeded
    PaymentSucceeded,
    /// Buyer landed on the success page
    SuccessPage,
}

impl PaymentSource {
    /// Label for logs and metrics
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout_completed",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::SuccessPage => "success_page",
        }
    }
}

/// A settled payment waiting to be turned into tickets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentCompletion {
    /// Delivery path
    pub source: PaymentSource,
    /// Metadata written at checkout
    pub metadata: Metadata,
    /// Processor charge id
    pub payment_reference: PaymentReference,
    /// Amount charged
    pub amount: Money,
    /// Checkout session, when known (needed for the line-item fallback)
    pub session_id: Option<String>,
    /// Connected account the session lives on
    pub connected_account: Option<String>,
}

/// Payment event as delivered to the webhook, signature already verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWebhookEvent {
    /// Processor event type
    #[serde(rename = "type")]
    pub event_type: String,
    /// Session or charge metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Charge id
    #[serde(default)]
    pub payment_reference: Option<PaymentReference>,
    /// Amount in cents
    #[serde(default)]
    pub amount: Option<u64>,
    /// Checkout session id
    #[serde(default)]
    pub session_id: Option<String>,
    /// Connected account the event was raised on
    #[serde(default)]
    pub account: Option<String>,
}

impl PaymentWebhookEvent {
    /// Converts a supported event into a completion.
    ///
    /// Returns `Ok(None)` for event types that carry no payment.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::MissingPaymentReference`] if a payment event
    /// has no charge id.
    pub fn into_completion(self) -> Result<Option<PaymentCompletion>, ReconcileError> {
        let source = match self.event_type.as_str() {
            CHECKOUT_COMPLETED => PaymentSource::CheckoutCompleted,
            PAYMENT_SUCCEEDED => PaymentSource::PaymentSucceeded,
            _ => return Ok(None),
        };
        let payment_reference = self
            .payment_reference
            .filter(|reference| !reference.as_str().is_empty())
            .ok_or(ReconcileError::MissingPaymentReference)?;

        let amount = self.amount.unwrap_or_else(|| {
            warn!(
                event_type = %self.event_type,
                payment_reference = %payment_reference,
                "Payment event carries no amount, recording tickets as unpaid"
            );
            0
        });

        Ok(Some(PaymentCompletion {
            source,
            metadata: self.metadata,
            payment_reference,
            amount: Money::from_cents(amount),
            session_id: self.session_id,
            connected_account: self.account,
        }))
    }
}

/// Reconciliation failures
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Metadata lacks the identifying fields
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Payment event without a charge id
    #[error("payment event carries no payment reference")]
    MissingPaymentReference,

    /// Metadata names an event that does not exist
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// Metadata does not match the ledger
    #[error(transparent)]
    Rejected(#[from] IssuanceError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Processor lookup failure
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// Optimistic retries exhausted
    #[error("event {0} is too contended, payment will be retried")]
    Contention(EventId),
}

impl ReconcileError {
    /// Error taxonomy classification.
    ///
    /// Validation failures are answered with a client error and never
    /// redelivered; everything else asks the processor to retry.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Metadata(_)
            | Self::MissingPaymentReference
            | Self::EventNotFound(_)
            | Self::Rejected(_) => ErrorKind::Validation,
            Self::Store(error) => error.kind(),
            Self::Processor(error) => error.kind(),
            Self::Contention(_) => ErrorKind::Transient,
        }
    }
}

/// Turns payment completions into tickets, exactly once per charge.
#[derive(Clone)]
pub struct Reconciler {
    repository: LedgerRepository,
    processor: Arc<dyn PaymentProcessor>,
}

impl Reconciler {
    /// Creates a reconciler
    #[must_use]
    pub fn new(repository: LedgerRepository, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            repository,
            processor,
        }
    }

    /// Reconciles one payment completion.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`]; see [`ReconcileError::kind`] for which
    /// failures are safe to retry.
    pub async fn reconcile(
        &self,
        completion: PaymentCompletion,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let started = Instant::now();
        let source = completion.source.label();
        let reference = completion.payment_reference.clone();

        let metadata = CheckoutMetadata::decode(&completion.metadata).inspect_err(|error| {
            warn!(source, payment_reference = %reference, %error, "Rejecting payment with malformed metadata");
        })?;

        let outcome = match self.recorded_outcome(&reference).await? {
            Some(outcome) => outcome,
            None => self.issue(&completion, metadata).await?,
        };

        let tickets = match &outcome {
            ReconcileOutcome::Issued { tickets } => tickets.len(),
            _ => 0,
        };
        match &outcome {
            ReconcileOutcome::Unfulfilled { reason } => {
                warn!(source, payment_reference = %reference, reason = %reason, "Payment recorded without tickets");
            }
            _ => info!(source, payment_reference = %reference, outcome = outcome.label(), tickets, "Payment reconciled"),
        }
        crate::metrics::record_reconciliation(
            source,
            outcome.label(),
            tickets,
            started.elapsed().as_secs_f64(),
        );
        Ok(outcome)
    }

    async fn issue(
        &self,
        completion: &PaymentCompletion,
        metadata: CheckoutMetadata,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let quantity = match metadata.quantity {
            Some(quantity) => quantity,
            None => self.quantity_from_line_items(completion).await?,
        };
        let event_id = metadata.event_id;
        let command = IssueTickets {
            payment_reference: completion.payment_reference.clone(),
            entry_id: metadata.entry_id,
            buyer_id: metadata.buyer_id,
            quantity,
            attendee_names: metadata.attendee_names,
            buyer: metadata.buyer,
            amount: completion.amount,
        };

        match self
            .repository
            .dispatch(event_id, &IssuanceReducer, command)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(DispatchError::Store(StoreError::DuplicatePaymentReference(reference))) => self
                .recorded_outcome(&reference)
                .await?
                .ok_or_else(|| {
                    ReconcileError::Store(StoreError::Corrupted(format!(
                        "payment {reference} is indexed but has no record"
                    )))
                }),
            Err(DispatchError::EventNotFound(event_id)) => Err(ReconcileError::EventNotFound(event_id)),
            Err(DispatchError::Rejected(error)) => Err(error.into()),
            Err(DispatchError::Store(error)) => Err(error.into()),
            Err(DispatchError::Contention { event_id, .. }) => Err(ReconcileError::Contention(event_id)),
        }
    }

    /// What an already-claimed reference produced, wherever it was claimed.
    pub(crate) async fn recorded_outcome(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<ReconcileOutcome>, ReconcileError> {
        let Some(event_id) = self.repository.store().find_issuance(reference).await? else {
            return Ok(None);
        };
        let Some(ledger) = self.repository.load(event_id).await? else {
            return Ok(None);
        };
        Ok(ledger.payment(reference).map(|record| match record {
            PaymentRecord::Issued { .. } => ReconcileOutcome::AlreadyProcessed {
                tickets: ledger.tickets_for_payment(reference),
            },
            PaymentRecord::Unfulfilled { reason, .. } => ReconcileOutcome::Unfulfilled {
                reason: reason.clone(),
            },
        }))
    }

    /// Ticket units from the processor's line items, excluding the fee line.
    ///
    /// Falls back to one when the session is unknown or lists no tickets.
    async fn quantity_from_line_items(
        &self,
        completion: &PaymentCompletion,
    ) -> Result<u32, ReconcileError> {
        let fallback = 1;
        let Some(session_id) = completion.session_id.as_deref() else {
            return Ok(fallback);
        };

        match self
            .processor
            .list_line_items(session_id, completion.connected_account.as_deref())
            .await
        {
            Ok(items) => {
                let quantity = items
                    .iter()
                    .filter(|item| item.description != FEE_LINE_ITEM_NAME)
                    .fold(0_u32, |total, item| total.saturating_add(item.quantity));
                Ok(if quantity == 0 { fallback } else { quantity })
            }
            Err(error) if error.kind().is_retryable() => Err(error.into()),
            Err(error) => {
                warn!(session_id, %error, "Line items unavailable, assuming one ticket");
                Ok(fallback)
            }
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

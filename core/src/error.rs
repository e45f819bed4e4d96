//! Error taxonomy.
//!
//! Every component error classifies itself with an [`ErrorKind`] so outer
//! layers decide retry and response behavior without matching on variants.
//! [`BoxOfficeError`] is the umbrella returned by [`crate::BoxOffice`].

use crate::aggregates::{EventError, WaitlistError};
use crate::checkout::CheckoutError;
use crate::payment_processor::ProcessorError;
use crate::reconciliation::ReconcileError;
use crate::store::StoreError;
use crate::types::{EventId, TicketId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failure should be handled by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or a violated precondition; never retried
    Validation,
    /// Lost a race with another writer; resolved by re-reading state
    Conflict,
    /// Dependency unavailable; safe to retry
    Transient,
    /// Broken invariant; abort
    Internal,
}

impl ErrorKind {
    /// Whether the same request may succeed if repeated
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Conflict | Self::Transient)
    }
}

/// Errors returned by the [`crate::BoxOffice`] facade.
#[derive(Debug, Error)]
pub enum BoxOfficeError {
    /// No such event
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// No such ticket (or not visible to the caller)
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),

    /// Caller is not the event's seller
    #[error("caller does not own event {0}")]
    Forbidden(EventId),

    /// Event creation or cancellation rejected
    #[error(transparent)]
    Event(#[from] EventError),

    /// Waiting-list transition rejected
    #[error(transparent)]
    Waitlist(#[from] WaitlistError),

    /// Checkout preconditions failed
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Payment could not be reconciled
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Payment processor failure
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// Optimistic retries exhausted
    #[error("event {0} is too contended, try again")]
    Contention(EventId),
}

impl From<std::convert::Infallible> for BoxOfficeError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl BoxOfficeError {
    /// Error taxonomy classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EventNotFound(_) | Self::TicketNotFound(_) | Self::Forbidden(_) => {
                ErrorKind::Validation
            }
            Self::Event(error) => error.kind(),
            Self::Waitlist(error) => error.kind(),
            Self::Checkout(error) => error.kind(),
            Self::Reconcile(error) => error.kind(),
            Self::Store(error) => error.kind(),
            Self::Processor(error) => error.kind(),
            Self::Contention(_) => ErrorKind::Conflict,
        }
    }

    /// Whether the request may be retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

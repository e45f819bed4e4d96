//! Outbound payment processor interface.
//!
//! A checkout creates a hosted payment session on the seller's connected
//! account; the processor later reports the outcome by webhook, or the
//! success page pulls the session back. Everything reconciliation needs
//! travels in the session's flat string metadata.
//!
//! # Implementations
//!
//! - [`HttpPaymentProcessor`]: Stripe-compatible form-encoded HTTP API
//! - [`MockPaymentProcessor`]: in-memory sessions for development and tests

mod http;
mod mock;

pub use http::HttpPaymentProcessor;
pub use mock::MockPaymentProcessor;

use crate::error::ErrorKind;
use crate::types::{Money, PaymentReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Payment processor result
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Boxed future returned by [`PaymentProcessor`] methods.
pub type ProcessorFuture<'a, T> = Pin<Box<dyn Future<Output = ProcessorResult<T>> + Send + 'a>>;

/// Flat string metadata attached to a session.
pub type Metadata = BTreeMap<String, String>;

/// Payment processor errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// Request never got a response
    #[error("payment processor request failed: {0}")]
    RequestFailed(String),

    /// Response could not be parsed
    #[error("payment processor response could not be parsed: {0}")]
    ResponseParseFailed(String),

    /// Credentials rejected
    #[error("payment processor rejected credentials")]
    Unauthorized,

    /// Too many requests
    #[error("payment processor rate limited the request")]
    RateLimited,

    /// Session id unknown to the processor
    #[error("payment session {0} not found")]
    SessionNotFound(String),

    /// Processor refused the request
    #[error("payment processor error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the processor
        message: String,
    },
}

impl ProcessorError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestFailed(_) | Self::RateLimited => ErrorKind::Transient,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::Transient,
            Self::SessionNotFound(_) | Self::Api { .. } => ErrorKind::Validation,
            Self::ResponseParseFailed(_) | Self::Unauthorized => ErrorKind::Internal,
        }
    }
}

/// One line on the hosted payment page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Price of one unit
    pub unit_amount: Money,
    /// Units
    pub quantity: u32,
}

/// Everything needed to open a hosted payment session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSessionRequest {
    /// ISO currency code, lowercase
    pub currency: String,
    /// Ticket line, then the optional fee line
    pub line_items: Vec<LineItem>,
    /// Platform's cut, forwarded through the split payment
    pub application_fee: Money,
    /// Instant the session stops accepting payment
    pub expires_at: DateTime<Utc>,
    /// Reconciliation metadata, copied onto the session and the charge
    pub metadata: Metadata,
    /// Where the buyer lands after paying (`{CHECKOUT_SESSION_ID}` is substituted)
    pub success_url: String,
    /// Where the buyer lands after abandoning
    pub cancel_url: String,
    /// Seller's connected account the charge settles to
    pub connected_account: String,
}

impl PaymentSessionRequest {
    /// Sum of all line items
    #[must_use]
    pub fn amount_total(&self) -> Money {
        self.line_items.iter().fold(Money::ZERO, |total, item| {
            item.unit_amount
                .checked_multiply(item.quantity)
                .map_or(total, |line| total.saturating_add(line))
        })
    }
}

/// A created hosted payment session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Processor session id
    pub session_id: String,
    /// Hosted page the buyer is redirected to
    pub url: String,
}

/// Session status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Awaiting payment
    Open,
    /// Buyer finished the flow
    Complete,
    /// Session lapsed
    Expired,
}

/// A session as read back from the processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDetails {
    /// Processor session id
    pub session_id: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Whether funds were captured
    pub paid: bool,
    /// Charge id, once paid
    pub payment_reference: Option<PaymentReference>,
    /// Amount charged
    pub amount_total: Option<Money>,
    /// Metadata set at creation
    pub metadata: Metadata,
}

/// One line item as reported by the processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemSummary {
    /// Product name
    pub description: String,
    /// Units
    pub quantity: u32,
}

/// Payment processor abstraction.
pub trait PaymentProcessor: Send + Sync {
    /// Opens a hosted payment session on the connected account.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] if the processor refuses or cannot be reached.
    fn create_session(&self, request: PaymentSessionRequest) -> ProcessorFuture<'_, PaymentSession>;

    /// Reads a session back.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::SessionNotFound`] for unknown sessions.
    fn retrieve_session<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: &'a str,
    ) -> ProcessorFuture<'a, SessionDetails>;

    /// Lists a session's line items.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::SessionNotFound`] for unknown sessions.
    fn list_line_items<'a>(
        &'a self,
        session_id: &'a str,
        connected_account: Option<&'a str>,
    ) -> ProcessorFuture<'a, Vec<LineItemSummary>>;
}

//! Transactional storage for event ledgers.
//!
//! Each event owns one append-only stream of [`LedgerEvent`]s. Appends carry
//! the version the writer read, so two writers racing on the same event
//! cannot both commit: the loser gets [`StoreError::ConcurrencyConflict`],
//! re-reads and re-decides. Payment references are additionally held in a
//! store-wide unique index, so a reference can be claimed by one append only,
//! even across events.
//!
//! # Implementations
//!
//! - [`InMemoryLedgerStore`]: single-lock in-process store
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` so the store can be shared as
//! `Arc<dyn LedgerStore>`.

mod memory;
mod repository;

pub use memory::InMemoryLedgerStore;
pub use repository::{DispatchError, LedgerRepository};

use crate::error::ErrorKind;
use crate::ledger::LedgerEvent;
use crate::types::{BuyerId, EventId, PaymentReference, Ticket, TicketId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`LedgerStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Number of events in a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of an empty stream
    pub const INITIAL: Self = Self(0);

    /// Creates a version
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stream as read at one version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredStream {
    /// Events in append order
    pub events: Vec<LedgerEvent>,
    /// Version to pass back when appending
    pub version: Version,
}

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer appended since the stream was read
    #[error("concurrency conflict on event {event_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Stream
        event_id: EventId,
        /// Version the writer read
        expected: Version,
        /// Version found
        actual: Version,
    },

    /// Payment reference already claimed by a committed append
    #[error("payment reference {0} already claimed")]
    DuplicatePaymentReference(PaymentReference),

    /// Backend unreachable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored data cannot be read back
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConcurrencyConflict { .. } | Self::DuplicatePaymentReference(_) => {
                ErrorKind::Conflict
            }
            Self::Unavailable(_) => ErrorKind::Transient,
            Self::Corrupted(_) => ErrorKind::Internal,
        }
    }
}

/// Abstract transactional store for event ledgers.
pub trait LedgerStore: Send + Sync {
    /// Appends `events` to the stream if it is still at `expected`.
    ///
    /// The append is atomic: either every event is stored and indexed, or
    /// nothing is.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ConcurrencyConflict`] if the stream moved past `expected`
    /// - [`StoreError::DuplicatePaymentReference`] if any event claims a reference
    ///   that is already claimed
    /// - [`StoreError::Unavailable`] if the backend cannot be reached
    fn append(
        &self,
        event_id: EventId,
        expected: Version,
        events: Vec<LedgerEvent>,
    ) -> StoreFuture<'_, Version>;

    /// Reads a stream. A stream that was never written reads as empty at
    /// [`Version::INITIAL`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn load(&self, event_id: EventId) -> StoreFuture<'_, StoredStream>;

    /// Event a ticket was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn locate_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<EventId>>;

    /// Event whose stream claimed a payment reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn find_issuance<'a>(
        &'a self,
        reference: &'a PaymentReference,
    ) -> StoreFuture<'a, Option<EventId>>;

    /// Every ticket a buyer holds, at its current status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn tickets_for_buyer<'a>(&'a self, buyer_id: &'a BuyerId) -> StoreFuture<'a, Vec<Ticket>>;

    /// Every event, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn event_ids(&self) -> StoreFuture<'_, Vec<EventId>>;
}

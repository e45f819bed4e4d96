//! Waiting-list and offer state machine.
//!
//! ```text
//! waiting ──Promote──▶ offered ──Consume──▶ purchased
//!                         │
//!                         ├──(now >= expires_at)──▶ expired
//!                         └──Release──────────────▶ cancelled
//! ```
//!
//! Expiry is derived from the stored `offer_expires_at`; `OfferExpired` is only
//! written to tidy the stream, never needed for correctness. Promotion runs
//! inside the ledger transaction so concurrent promotions on one event can
//! never grant more offers than remaining capacity.

use crate::error::ErrorKind;
use crate::ledger::{EventLedger, LedgerEvent};
use crate::reducer::{LedgerEnvironment, Recorder, Reduced, Reducer};
use crate::types::{BuyerId, EntryId, EntryStatus, Event, WaitingListEntry};
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Actions
// ============================================================================

/// Actions for the waiting list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitlistAction {
    /// Enter the queue (no-op if already queued or holding a live offer)
    Join {
        /// Buyer
        buyer_id: BuyerId,
    },
    /// Grant offers to waiting buyers, oldest first, while capacity remains
    Promote,
    /// Record lapsed offers as expired
    ExpireOffers,
    /// Buyer gives back a live offer
    Release {
        /// Caller, must own the entry
        buyer_id: BuyerId,
        /// Entry to release
        entry_id: EntryId,
    },
    /// Mark an offer purchased
    Consume {
        /// Entry
        entry_id: EntryId,
    },
}

/// What a waiting-list reduction produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitlistOutput {
    /// The entry joined, released or consumed
    Entry(WaitingListEntry),
    /// Entries promoted or expired by a sweep
    Entries(Vec<EntryId>),
}

/// Waiting-list rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitlistError {
    /// Stream holds no event
    #[error("event not found")]
    EventNotFound,

    /// Event was cancelled
    #[error("event has been cancelled")]
    EventCancelled,

    /// Sales deadline has passed
    #[error("ticket sales for this event have closed")]
    SalesClosed,

    /// No such entry on this event
    #[error("waiting list entry {0} not found")]
    EntryNotFound(EntryId),

    /// Caller does not own the entry
    #[error("waiting list entry belongs to another buyer")]
    NotEntryOwner,

    /// Entry is not holding a live offer
    #[error("no active offer to release")]
    NoActiveOffer,

    /// Entry cannot move to purchased from its current state
    #[error("waiting list entry {entry_id} cannot be purchased from {status:?}")]
    NotPurchasable {
        /// Entry
        entry_id: EntryId,
        /// Stored status
        status: EntryStatus,
    },
}

impl WaitlistError {
    /// Error taxonomy classification
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotPurchasable { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Validation,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer owning every `WaitingListEntry` status transition
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitlistReducer;

impl WaitlistReducer {
    /// Creates a new `WaitlistReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_open(ledger: &EventLedger, now: DateTime<Utc>) -> Result<&Event, WaitlistError> {
        let event = ledger.event().ok_or(WaitlistError::EventNotFound)?;
        if event.is_cancelled {
            return Err(WaitlistError::EventCancelled);
        }
        if event.sales_closed(now) {
            return Err(WaitlistError::SalesClosed);
        }
        Ok(event)
    }

    /// Records every lapsed offer as expired.
    fn expire_lapsed(
        ledger: &mut EventLedger,
        recorder: &mut Recorder,
        now: DateTime<Utc>,
    ) -> Vec<EntryId> {
        let lapsed = ledger.lapsed_offers(now);
        for entry_id in &lapsed {
            recorder.record(
                ledger,
                LedgerEvent::OfferExpired {
                    entry_id: *entry_id,
                    expired_at: now,
                },
            );
        }
        lapsed
    }

    fn entry(ledger: &EventLedger, entry_id: EntryId) -> Result<WaitingListEntry, WaitlistError> {
        ledger
            .entry(entry_id)
            .cloned()
            .ok_or(WaitlistError::EntryNotFound(entry_id))
    }
}

/// Event marking `entry_id` purchased.
///
/// A lapsed, expired or released offer can still be consumed: the buyer has
/// already paid, and capacity is re-checked by the caller.
///
/// # Errors
///
/// - [`WaitlistError::EntryNotFound`] if the entry does not exist
/// - [`WaitlistError::NotPurchasable`] if it is still waiting or already purchased
pub fn consume_event(
    ledger: &EventLedger,
    entry_id: EntryId,
    now: DateTime<Utc>,
) -> Result<LedgerEvent, WaitlistError> {
    let entry = ledger
        .entry(entry_id)
        .ok_or(WaitlistError::EntryNotFound(entry_id))?;
    match entry.status {
        EntryStatus::Offered | EntryStatus::Expired | EntryStatus::Cancelled => {
            Ok(LedgerEvent::OfferConsumed {
                entry_id,
                consumed_at: now,
            })
        }
        status @ (EntryStatus::Waiting | EntryStatus::Purchased) => {
            Err(WaitlistError::NotPurchasable { entry_id, status })
        }
    }
}

impl Reducer for WaitlistReducer {
    type Action = WaitlistAction;
    type Output = WaitlistOutput;
    type Error = WaitlistError;

    fn reduce(
        &self,
        ledger: &mut EventLedger,
        action: WaitlistAction,
        env: &LedgerEnvironment,
    ) -> Result<Reduced<WaitlistOutput>, WaitlistError> {
        let now = env.now();
        let mut recorder = Recorder::new();

        match action {
            WaitlistAction::Join { buyer_id } => {
                Self::validate_open(ledger, now)?;

                if let Some(existing) = ledger.active_entry_for_buyer(&buyer_id, now) {
                    return Ok(Reduced::unchanged(WaitlistOutput::Entry(existing.clone())));
                }

                // A lapsed offer is still stored as offered; close it before re-queueing.
                let lapsed: Vec<EntryId> = ledger
                    .entries()
                    .iter()
                    .filter(|entry| entry.buyer_id == buyer_id && entry.offer_lapsed(now))
                    .map(|entry| entry.id)
                    .collect();
                for entry_id in lapsed {
                    recorder.record(
                        ledger,
                        LedgerEvent::OfferExpired {
                            entry_id,
                            expired_at: now,
                        },
                    );
                }

                let entry_id = EntryId::new();
                recorder.record(
                    ledger,
                    LedgerEvent::BuyerJoined {
                        entry_id,
                        buyer_id,
                        joined_at: now,
                    },
                );
                let entry = Self::entry(ledger, entry_id)?;
                Ok(recorder.finish(WaitlistOutput::Entry(entry)))
            }

            WaitlistAction::Promote => {
                if ledger.event().is_none() {
                    return Err(WaitlistError::EventNotFound);
                }
                Self::expire_lapsed(ledger, &mut recorder, now);

                if Self::validate_open(ledger, now).is_err() {
                    return Ok(recorder.finish(WaitlistOutput::Entries(Vec::new())));
                }

                let remaining = ledger.remaining_capacity(now) as usize;
                let promoted: Vec<EntryId> = ledger
                    .entries()
                    .iter()
                    .filter(|entry| entry.status == EntryStatus::Waiting)
                    .take(remaining)
                    .map(|entry| entry.id)
                    .collect();

                let expires_at = now + env.policy.offer_ttl;
                for entry_id in &promoted {
                    recorder.record(
                        ledger,
                        LedgerEvent::OfferGranted {
                            entry_id: *entry_id,
                            expires_at,
                        },
                    );
                }
                Ok(recorder.finish(WaitlistOutput::Entries(promoted)))
            }

            WaitlistAction::ExpireOffers => {
                if ledger.event().is_none() {
                    return Err(WaitlistError::EventNotFound);
                }
                let expired = Self::expire_lapsed(ledger, &mut recorder, now);
                Ok(recorder.finish(WaitlistOutput::Entries(expired)))
            }

            WaitlistAction::Release { buyer_id, entry_id } => {
                let entry = Self::entry(ledger, entry_id)?;
                if entry.buyer_id != buyer_id {
                    return Err(WaitlistError::NotEntryOwner);
                }
                if entry.status_at(now) != EntryStatus::Offered {
                    return Err(WaitlistError::NoActiveOffer);
                }
                recorder.record(
                    ledger,
                    LedgerEvent::OfferReleased {
                        entry_id,
                        released_at: now,
                    },
                );
                let entry = Self::entry(ledger, entry_id)?;
                Ok(recorder.finish(WaitlistOutput::Entry(entry)))
            }

            WaitlistAction::Consume { entry_id } => {
                let event = consume_event(ledger, entry_id, now)?;
                recorder.record(ledger, event);
                let entry = Self::entry(ledger, entry_id)?;
                Ok(recorder.finish(WaitlistOutput::Entry(entry)))
            }
        }
    }
}

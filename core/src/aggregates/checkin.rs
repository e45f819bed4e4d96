//! Ticket redemption at the door.
//!
//! `valid → used` is the only transition. Every other read ends in one of the
//! closed [`CheckInOutcome`] variants, never an error.

use crate::ledger::{EventLedger, LedgerEvent};
use crate::reducer::{LedgerEnvironment, Recorder, Reduced, Reducer};
use crate::types::{AttendeeInfo, SellerId, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Scan submitted by a seller at the entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckInAction {
    /// Decoded ticket id
    pub ticket_id: TicketId,
    /// Seller scanning
    pub seller_id: SellerId,
}

/// Result of a scan.
///
/// Ticket from another event and seller not owning the event both read as
/// [`CheckInOutcome::WrongEvent`] so a scan never reveals tickets of events the
/// seller does not own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckInOutcome {
    /// Ticket redeemed now
    CheckedIn {
        /// Who to let in
        attendee: AttendeeInfo,
    },
    /// Ticket was already used
    AlreadyCheckedIn,
    /// Ticket belongs to another event, or the seller does not own this one
    WrongEvent,
    /// Event is cancelled; nothing can be redeemed
    EventCancelled,
    /// Unknown ticket, or refunded/cancelled
    Invalid,
}

impl CheckInOutcome {
    /// Label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CheckedIn { .. } => "checked_in",
            Self::AlreadyCheckedIn => "already_checked_in",
            Self::WrongEvent => "wrong_event",
            Self::EventCancelled => "event_cancelled",
            Self::Invalid => "invalid",
        }
    }
}

/// Reducer owning the `valid → used` transition
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckInReducer;

impl CheckInReducer {
    /// Creates a new `CheckInReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for CheckInReducer {
    type Action = CheckInAction;
    type Output = CheckInOutcome;
    type Error = Infallible;

    fn reduce(
        &self,
        ledger: &mut EventLedger,
        action: CheckInAction,
        env: &LedgerEnvironment,
    ) -> Result<Reduced<CheckInOutcome>, Infallible> {
        let Some(event) = ledger.event() else {
            return Ok(Reduced::unchanged(CheckInOutcome::Invalid));
        };
        let Some(ticket) = ledger.ticket(action.ticket_id) else {
            return Ok(Reduced::unchanged(CheckInOutcome::Invalid));
        };

        let outcome = if !event.is_owned_by(&action.seller_id) {
            CheckInOutcome::WrongEvent
        } else if event.is_cancelled {
            CheckInOutcome::EventCancelled
        } else {
            match ticket.status {
                TicketStatus::Used => CheckInOutcome::AlreadyCheckedIn,
                TicketStatus::Refunded | TicketStatus::Cancelled => CheckInOutcome::Invalid,
                TicketStatus::Valid => {
                    let attendee = AttendeeInfo::from(ticket);
                    let mut recorder = Recorder::new();
                    recorder.record(
                        ledger,
                        LedgerEvent::TicketCheckedIn {
                            ticket_id: action.ticket_id,
                            checked_in_at: env.now(),
                        },
                    );
                    return Ok(recorder.finish(CheckInOutcome::CheckedIn { attendee }));
                }
            }
        };
        Ok(Reduced::unchanged(outcome))
    }
}
